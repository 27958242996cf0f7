use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A statement failed; carries enough context to reproduce it.
    #[error("Unable to execute collection SQL query: {source}")]
    Query {
        #[source]
        source: sqlx::Error,
        sql: String,
        bound_values: Vec<String>,
    },

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollectionError {
    /// The failing SQL text, for errors raised while executing a statement.
    pub fn sql(&self) -> Option<&str> {
        match self {
            CollectionError::Query { sql, .. } => Some(sql),
            _ => None,
        }
    }

    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        CollectionError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CollectionError>;
