//! Parameterized statements with their bound values kept alongside.
//!
//! Every statement the backend runs goes through [`SqlStatement`] so a
//! failure can be reported with the exact SQL text and the values that were
//! bound to it.

use crate::error::{CollectionError, Result};
use serde::{Deserialize, Serialize};
use sqlx::query::{Query, QueryAs};
use sqlx::sqlite::{SqliteArguments, SqliteQueryResult, SqliteRow};
use sqlx::{FromRow, Sqlite, SqliteConnection};
use std::fmt;

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    /// Only meaningful with the `IN` operator; exploded into one placeholder per element
    List(Vec<QueryValue>),
}

impl QueryValue {
    pub fn is_int(&self) -> bool {
        matches!(self, QueryValue::Int(_))
    }
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Null => f.write_str("NULL"),
            QueryValue::Int(v) => write!(f, "{}", v),
            QueryValue::Real(v) => write!(f, "{}", v),
            QueryValue::Text(v) => write!(f, "'{}'", v),
            QueryValue::List(values) => {
                let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "({})", rendered.join(", "))
            }
        }
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Int(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        QueryValue::Int(i64::from(value))
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Int(i64::from(value))
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        QueryValue::Real(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Text(value)
    }
}

impl From<&String> for QueryValue {
    fn from(value: &String) -> Self {
        QueryValue::Text(value.clone())
    }
}

impl<T: Into<QueryValue>> From<Vec<T>> for QueryValue {
    fn from(values: Vec<T>) -> Self {
        QueryValue::List(values.into_iter().map(Into::into).collect())
    }
}

fn bind_query<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &'q [QueryValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            QueryValue::Null => query.bind(None::<String>),
            QueryValue::Int(v) => query.bind(*v),
            QueryValue::Real(v) => query.bind(*v),
            QueryValue::Text(v) => query.bind(v.as_str()),
            QueryValue::List(items) => bind_query(query, items),
        };
    }
    query
}

fn bind_query_as<'q, O>(
    mut query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    values: &'q [QueryValue],
) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            QueryValue::Null => query.bind(None::<String>),
            QueryValue::Int(v) => query.bind(*v),
            QueryValue::Real(v) => query.bind(*v),
            QueryValue::Text(v) => query.bind(v.as_str()),
            QueryValue::List(items) => bind_query_as(query, items),
        };
    }
    query
}

/// SQL text plus the values bound to it, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    sql: String,
    values: Vec<QueryValue>,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            values: Vec::new(),
        }
    }

    pub fn with_values(sql: impl Into<String>, values: Vec<QueryValue>) -> Self {
        Self {
            sql: sql.into(),
            values,
        }
    }

    pub fn bind(mut self, value: impl Into<QueryValue>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn values(&self) -> &[QueryValue] {
        &self.values
    }

    fn error(&self, source: sqlx::Error) -> CollectionError {
        CollectionError::Query {
            source,
            sql: self.sql.clone(),
            bound_values: self.values.iter().map(ToString::to_string).collect(),
        }
    }

    pub async fn execute(&self, conn: &mut SqliteConnection) -> Result<SqliteQueryResult> {
        bind_query(sqlx::query(&self.sql), &self.values)
            .execute(conn)
            .await
            .map_err(|e| self.error(e))
    }

    pub async fn fetch_all(&self, conn: &mut SqliteConnection) -> Result<Vec<SqliteRow>> {
        bind_query(sqlx::query(&self.sql), &self.values)
            .fetch_all(conn)
            .await
            .map_err(|e| self.error(e))
    }

    pub async fn fetch_all_as<O>(&self, conn: &mut SqliteConnection) -> Result<Vec<O>>
    where
        O: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        bind_query_as(sqlx::query_as::<_, O>(&self.sql), &self.values)
            .fetch_all(conn)
            .await
            .map_err(|e| self.error(e))
    }

    pub async fn fetch_optional_as<O>(&self, conn: &mut SqliteConnection) -> Result<Option<O>>
    where
        O: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        bind_query_as(sqlx::query_as::<_, O>(&self.sql), &self.values)
            .fetch_optional(conn)
            .await
            .map_err(|e| self.error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_renders_bound_values() {
        let statement = SqlStatement::new("SELECT 1 WHERE a = ? AND b IN (?, ?)")
            .bind("x")
            .bind(vec![1_i64, 2]);
        let rendered: Vec<String> = statement.values().iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["'x'".to_string(), "(1, 2)".to_string()]);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(QueryValue::from(true), QueryValue::Int(1));
        assert_eq!(QueryValue::from(7_i32), QueryValue::Int(7));
        assert!(QueryValue::from(3_i64).is_int());
        assert!(!QueryValue::from("3").is_int());
    }

    #[tokio::test]
    async fn test_failed_statement_carries_sql_and_values() {
        let pool = crate::db::create_test_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let statement = SqlStatement::new("SELECT * FROM no_such_table WHERE x = ?").bind(5_i64);
        let err = statement.execute(&mut conn).await.unwrap_err();

        match err {
            CollectionError::Query {
                sql, bound_values, ..
            } => {
                assert!(sql.contains("no_such_table"));
                assert_eq!(bound_values, vec!["5".to_string()]);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
