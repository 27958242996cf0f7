//! Query options and the SQL builder for songs tables.
//!
//! [`CollectionQuery`] accumulates a column spec, `WHERE` fragments with their
//! bound values, an optional `ORDER BY` and `LIMIT`, and renders them into one
//! statement against a songs table. [`QueryOptions`] carries the filters the
//! model applies to every query and re-checks on pushed songs.

use crate::error::Result;
use crate::song::Song;
use crate::sql::{QueryValue, SqlStatement};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqliteConnection};

/// Placeholder replaced by the songs table name when the statement is rendered.
pub const SONGS_TABLE_PLACEHOLDER: &str = "%songs_table";

const DUPLICATES_JOIN: &str = " INNER JOIN (select * from duplicated_songs) dsongs \
     ON (%songs_table.artist = dsongs.dup_artist \
     AND %songs_table.album = dsongs.dup_album \
     AND %songs_table.title = dsongs.dup_title)";

/// Which rows of the songs table a query looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueryMode {
    #[default]
    All,
    /// Songs whose (artist, album, title) triple occurs more than once
    Duplicates,
    /// Songs missing an artist, album or title
    Untagged,
}

/// Filters shared by every query the model issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Maximum age in seconds by creation time, `-1` for no limit
    max_age: i64,
    query_mode: QueryMode,
    filter: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_age: -1,
            query_mode: QueryMode::All,
            filter: None,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    pub fn set_max_age(&mut self, max_age: i64) {
        self.max_age = max_age;
    }

    pub fn query_mode(&self) -> QueryMode {
        self.query_mode
    }

    /// Changing the mode drops any free-text filter.
    pub fn set_query_mode(&mut self, query_mode: QueryMode) {
        self.query_mode = query_mode;
        self.filter = None;
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = Some(filter.into());
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
    }

    /// Whether a song pushed by the backend still passes these options.
    ///
    /// `now` is the current unix time in seconds.
    pub fn matches(&self, song: &Song, now: i64) -> bool {
        if self.max_age != -1 {
            let cutoff = now - self.max_age;
            if song.ctime <= cutoff {
                return false;
            }
        }

        if let Some(filter) = &self.filter {
            let needle = filter.to_lowercase();
            return [&song.artist, &song.album, &song.title]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
        }

        true
    }
}

/// Builder for a `SELECT` against one songs table.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionQuery {
    songs_table: String,
    column_spec: String,
    order_by: String,
    where_clauses: Vec<String>,
    bound_values: Vec<QueryValue>,
    include_unavailable: bool,
    duplicates_only: bool,
    limit: Option<u32>,
}

impl CollectionQuery {
    /// Start a query on `songs_table` with the given options applied.
    ///
    /// `now` is the current unix time in seconds, used for the age cutoff.
    pub fn new(songs_table: impl Into<String>, options: &QueryOptions, now: i64) -> Self {
        let mut query = Self {
            songs_table: songs_table.into(),
            column_spec: String::new(),
            order_by: String::new(),
            where_clauses: Vec::new(),
            bound_values: Vec::new(),
            include_unavailable: false,
            duplicates_only: options.query_mode() == QueryMode::Duplicates,
            limit: None,
        };

        if options.max_age() != -1 {
            query.where_clauses.push("ctime > ?".to_string());
            query.bound_values.push(QueryValue::Int(now - options.max_age()));
        }

        if options.query_mode() == QueryMode::Untagged {
            query
                .where_clauses
                .push("(artist = '' OR album = '' OR title = '')".to_string());
        }

        query
    }

    pub fn songs_table(&self) -> &str {
        &self.songs_table
    }

    /// Contents of the `SELECT` clause.
    pub fn set_column_spec(&mut self, spec: impl Into<String>) {
        self.column_spec = spec.into();
    }

    pub fn set_order_by(&mut self, order_by: impl Into<String>) {
        self.order_by = order_by.into();
    }

    /// Add `column op value`. All fragments are joined with `AND`.
    ///
    /// Integers are written into the SQL text; SQLite's planner makes poor
    /// index choices when they are bound. With `IN`, `value` is expected to
    /// be a [`QueryValue::List`] and gets one placeholder per element.
    pub fn add_where(&mut self, column: &str, value: impl Into<QueryValue>, op: &str) {
        let value = value.into();

        if op.eq_ignore_ascii_case("IN") {
            let items = match value {
                QueryValue::List(items) => items,
                single => vec![single],
            };
            let placeholders = vec!["?"; items.len()].join(",");
            self.where_clauses
                .push(format!("{} IN ({})", column, placeholders));
            self.bound_values.extend(items);
            return;
        }

        match value {
            QueryValue::Int(v) => self.where_clauses.push(format!("{} {} {}", column, op, v)),
            QueryValue::Null => {
                self.where_clauses.push(format!("{} {} ?", column, op));
                self.bound_values.push(QueryValue::Text(String::new()));
            }
            other => {
                self.where_clauses.push(format!("{} {} ?", column, op));
                self.bound_values.push(other);
            }
        }
    }

    /// Match `artist` on songs without an album artist, `albumartist` otherwise.
    pub fn add_where_artist(&mut self, value: impl Into<QueryValue>) {
        let value = value.into();
        self.where_clauses
            .push("((artist = ? AND albumartist = '') OR albumartist = ?)".to_string());
        self.bound_values.push(value.clone());
        self.bound_values.push(value);
    }

    /// Require `compilation_effective` to equal `compilation`.
    ///
    /// The unary `+` keeps SQLite off the compilation/artist index.
    pub fn add_compilation_requirement(&mut self, compilation: bool) {
        self.where_clauses.push(format!(
            "+compilation_effective = {}",
            i32::from(compilation)
        ));
    }

    pub fn set_where_clauses(&mut self, where_clauses: Vec<String>) {
        self.where_clauses = where_clauses;
    }

    pub fn set_bound_values(&mut self, bound_values: Vec<QueryValue>) {
        self.bound_values = bound_values;
    }

    pub fn set_duplicates_only(&mut self, duplicates_only: bool) {
        self.duplicates_only = duplicates_only;
    }

    pub fn set_include_unavailable(&mut self, include_unavailable: bool) {
        self.include_unavailable = include_unavailable;
    }

    pub fn set_limit(&mut self, limit: Option<u32>) {
        self.limit = limit;
    }

    pub fn column_spec(&self) -> &str {
        &self.column_spec
    }

    pub fn order_by(&self) -> &str {
        &self.order_by
    }

    pub fn where_clauses(&self) -> &[String] {
        &self.where_clauses
    }

    pub fn bound_values(&self) -> &[QueryValue] {
        &self.bound_values
    }

    pub fn include_unavailable(&self) -> bool {
        self.include_unavailable
    }

    pub fn duplicates_only(&self) -> bool {
        self.duplicates_only
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    /// The final SQL text.
    pub fn sql(&self) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.column_spec, self.songs_table);
        if self.duplicates_only {
            sql.push_str(DUPLICATES_JOIN);
        }

        let mut where_clauses = self.where_clauses.clone();
        if !self.include_unavailable {
            where_clauses.push("unavailable = 0".to_string());
        }
        if !where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clauses.join(" AND "));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by);
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        sql.replace(SONGS_TABLE_PLACEHOLDER, &self.songs_table)
    }

    /// Rendered SQL with the values in placeholder order.
    pub fn statement(&self) -> SqlStatement {
        SqlStatement::with_values(self.sql(), self.bound_values.clone())
    }

    /// Run the query, yielding raw rows in column-spec order.
    pub async fn exec(&self, conn: &mut SqliteConnection) -> Result<Vec<SqliteRow>> {
        self.statement().fetch_all(conn).await
    }

    /// Run the query and map each row.
    pub async fn exec_as<O>(&self, conn: &mut SqliteConnection) -> Result<Vec<O>>
    where
        O: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        self.statement().fetch_all_as(conn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn song(artist: &str, album: &str, title: &str, ctime: i64) -> Song {
        Song {
            artist: artist.to_string(),
            album: album.to_string(),
            title: title.to_string(),
            ctime,
            ..Song::default()
        }
    }

    #[test]
    fn test_plain_query() {
        let mut query = CollectionQuery::new("songs", &QueryOptions::default(), NOW);
        query.set_column_spec("DISTINCT artist");
        query.set_order_by("artist");

        assert_eq!(
            query.sql(),
            "SELECT DISTINCT artist FROM songs WHERE unavailable = 0 ORDER BY artist"
        );
        assert!(query.bound_values().is_empty());
    }

    #[test]
    fn test_integers_are_inlined_and_strings_bound() {
        let mut query = CollectionQuery::new("songs", &QueryOptions::default(), NOW);
        query.set_column_spec("ROWID");
        query.add_where("directory_id", 5_i64, "=");
        query.add_where("album", "Jazz", "!=");

        assert_eq!(
            query.sql(),
            "SELECT ROWID FROM songs WHERE directory_id = 5 AND album != ? AND unavailable = 0"
        );
        assert_eq!(query.bound_values(), &[QueryValue::from("Jazz")]);
    }

    #[test]
    fn test_in_operator_explodes_list() {
        let mut query = CollectionQuery::new("tidal_songs", &QueryOptions::default(), NOW);
        query.set_column_spec("ROWID");
        query.add_where("song_id", vec!["a", "b", "c"], "IN");

        assert!(query.sql().contains("song_id IN (?,?,?)"));
        assert_eq!(query.bound_values().len(), 3);
    }

    #[test]
    fn test_artist_and_compilation_clauses() {
        let mut query = CollectionQuery::new("songs", &QueryOptions::default(), NOW);
        query.set_column_spec("album");
        query.add_compilation_requirement(false);
        query.add_where_artist("Queen");

        let sql = query.sql();
        assert!(sql.contains("+compilation_effective = 0"));
        assert!(sql.contains("((artist = ? AND albumartist = '') OR albumartist = ?)"));
        assert_eq!(query.bound_values().len(), 2);
    }

    #[test]
    fn test_options_shape_query() {
        let mut options = QueryOptions::default();
        options.set_max_age(3600);
        options.set_query_mode(QueryMode::Untagged);

        let mut query = CollectionQuery::new("songs", &options, NOW);
        query.set_column_spec("ROWID");
        query.set_include_unavailable(true);
        query.set_limit(Some(10));

        assert_eq!(
            query.sql(),
            "SELECT ROWID FROM songs WHERE ctime > ? AND (artist = '' OR album = '' OR title = '') LIMIT 10"
        );
        assert_eq!(query.bound_values(), &[QueryValue::Int(NOW - 3600)]);
    }

    #[test]
    fn test_duplicates_join_uses_table_name() {
        let mut options = QueryOptions::default();
        options.set_query_mode(QueryMode::Duplicates);

        let mut query = CollectionQuery::new("songs", &options, NOW);
        query.set_column_spec("%songs_table.ROWID");

        let sql = query.sql();
        assert!(sql.starts_with("SELECT songs.ROWID FROM songs INNER JOIN"));
        assert!(sql.contains("songs.title = dsongs.dup_title"));
        assert!(!sql.contains(SONGS_TABLE_PLACEHOLDER));
    }

    #[test]
    fn test_matches_age() {
        let mut options = QueryOptions::default();
        assert!(options.matches(&song("a", "b", "c", 0), NOW));

        options.set_max_age(100);
        assert!(options.matches(&song("a", "b", "c", NOW - 99), NOW));
        assert!(!options.matches(&song("a", "b", "c", NOW - 100), NOW));
    }

    #[test]
    fn test_matches_filter() {
        let mut options = QueryOptions::default();
        options.set_filter("OPERA");

        assert!(options.matches(&song("Queen", "A Night at the Opera", "x", 0), NOW));
        assert!(!options.matches(&song("Queen", "Jazz", "Mustapha", 0), NOW));

        options.set_query_mode(QueryMode::All);
        assert!(options.filter().is_none());
        assert!(options.matches(&song("Queen", "Jazz", "Mustapha", 0), NOW));
    }

    #[tokio::test]
    async fn test_exec_against_database() {
        let pool = crate::db::create_test_pool().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        sqlx::query("INSERT INTO songs (title, artist, album, url) VALUES ('t', 'Queen', 'Jazz', 'file:///a')")
            .execute(&mut *conn)
            .await
            .unwrap();

        let mut query = CollectionQuery::new("songs", &QueryOptions::default(), NOW);
        query.set_column_spec("DISTINCT album");
        query.add_where_artist("Queen");

        let rows: Vec<(String,)> = query.exec_as(&mut conn).await.unwrap();
        assert_eq!(rows, vec![("Jazz".to_string(),)]);
    }
}
