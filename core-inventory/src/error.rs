use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] BridgeError),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Duplicate {table} record: {message}")]
    Conflict { table: String, message: String },

    #[error("Relation endpoint missing in {table}: {id}")]
    EndpointMissing { table: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl InventoryError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        InventoryError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Map a write error, turning UNIQUE violations into `Conflict`.
    pub(crate) fn from_write(table: &str, error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => InventoryError::Conflict {
                table: table.to_string(),
                message: db.message().to_string(),
            },
            _ => InventoryError::Database(error),
        }
    }
}

pub type Result<T> = std::result::Result<T, InventoryError>;
