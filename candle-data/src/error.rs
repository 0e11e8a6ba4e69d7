use crate::config::ConfigError;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// The table descriptor is missing a usable name or identity column.
    #[error("Misconfigured entity: {0}")]
    MisconfiguredEntity(String),

    /// A session was used before a connection or connection string was set.
    #[error("Session is not configured: call set_connection or set_connection_string first")]
    NotConfigured,

    /// The session refuses to be configured twice.
    #[error("Session is already configured")]
    AlreadyConfigured,

    /// A value cannot be adapted to, or decoded from, SQL.
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// Not a mapping key, not a declared member, and not a known routine.
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    /// `save`, `delete` or `refresh` on an entity whose id column is unset or null.
    #[error("Entity of table '{table}' has no value for id column '{id_column}'")]
    MissingIdentity { table: String, id_column: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// A row did not have the shape the statement guarantees.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Driver-level failure, propagated unmodified.
    #[error("Database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DataError {
    /// Construct a `Database` variant from any error type.
    ///
    /// Used by backend crates (e.g. `candle-data-sqlx`) to wrap
    /// driver-specific errors.
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        DataError::Database(Box::new(err))
    }

    /// Whether the error was raised by the database rather than by this layer.
    pub fn is_database(&self) -> bool {
        matches!(self, DataError::Database(_))
    }
}

/// Convenience alias for data-layer results.
pub type DataResult<T> = Result<T, DataError>;
