use crate::config::SessionConfig;
use crate::error::DataError;
use crate::query::Statement;
use crate::value::Fields;
use async_trait::async_trait;

/// The database capability a [`Session`](crate::Session) drives.
///
/// Implementations execute [`Statement`]s with their parameters bound, decode
/// rows into [`Fields`], and own transaction state: statements run inside an
/// open transaction until `commit` or `rollback`. Backends live in their own
/// crates (e.g. `candle-data-sqlx` for PostgreSQL).
#[async_trait]
pub trait Connection: Send + 'static {
    /// Open a connection from a connection string.
    async fn connect(url: &str, config: &SessionConfig) -> Result<Self, DataError>
    where
        Self: Sized;

    /// Run a statement and return every row it produced.
    async fn fetch_all(&mut self, stmt: &Statement) -> Result<Vec<Fields>, DataError>;

    /// Run a statement and return its first row, if any.
    async fn fetch_optional(&mut self, stmt: &Statement) -> Result<Option<Fields>, DataError> {
        Ok(self.fetch_all(stmt).await?.into_iter().next())
    }

    /// Run a statement for its effect; returns the number of rows affected.
    async fn execute(&mut self, stmt: &Statement) -> Result<u64, DataError>;

    async fn commit(&mut self) -> Result<(), DataError>;

    async fn rollback(&mut self) -> Result<(), DataError>;

    /// Close the connection. Uncommitted work is discarded by the server.
    async fn close(self) -> Result<(), DataError>
    where
        Self: Sized,
    {
        Ok(())
    }
}
