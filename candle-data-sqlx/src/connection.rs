//! [`Connection`] implementation over a single `sqlx` PostgreSQL connection.

use crate::decode::decode_row;
use crate::error::{SqlxErrorExt, SqlxResult};
use async_trait::async_trait;
use candle_data::{Connection, DataError, Fields, SessionConfig, Statement, Value};
use sqlx::postgres::{PgArguments, PgConnectOptions, Postgres};
use sqlx::query::Query;
use sqlx::{ConnectOptions, Connection as _, Executor};
use std::str::FromStr;
use tracing::{debug, info};

/// One PostgreSQL connection with server-side transaction tracking.
///
/// The first statement after connecting, committing or rolling back opens a
/// transaction, so writes stay invisible to other sessions until `commit`.
pub struct PgConnection {
    conn: sqlx::PgConnection,
    in_transaction: bool,
}

impl PgConnection {
    /// Wrap an already established `sqlx` connection.
    ///
    /// The connection must not be inside a transaction.
    pub fn from_sqlx(conn: sqlx::PgConnection) -> Self {
        Self {
            conn,
            in_transaction: false,
        }
    }

    pub fn into_sqlx(self) -> sqlx::PgConnection {
        self.conn
    }

    /// Whether a transaction is open on the server.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn begin_if_needed(&mut self) -> SqlxResult<()> {
        if !self.in_transaction {
            Executor::execute(&mut self.conn, "BEGIN")
                .await
                .map_err(SqlxErrorExt::into_data_error)?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn end(&mut self, command: &'static str) -> SqlxResult<()> {
        if self.in_transaction {
            // A failed COMMIT still ends the transaction server-side.
            self.in_transaction = false;
            Executor::execute(&mut self.conn, command)
                .await
                .map_err(SqlxErrorExt::into_data_error)?;
        }
        Ok(())
    }
}

/// Connect options for `url` with the session's settings applied.
pub fn connect_options(url: &str, config: &SessionConfig) -> SqlxResult<PgConnectOptions> {
    let mut options = PgConnectOptions::from_str(url).map_err(SqlxErrorExt::into_data_error)?;
    if let Some(name) = &config.application_name {
        options = options.application_name(name);
    }
    if let Some(timeout) = config.statement_timeout {
        options = options.options([("statement_timeout", timeout.as_millis())]);
    }
    Ok(options)
}

/// Inline text and raw parameters as literals.
///
/// Parameters travel in binary format with a declared type, so a bound
/// `text` would not coerce into `date`, enum or other columns the way a
/// quoted constant does.
fn inline_text(stmt: &Statement) -> SqlxResult<Statement> {
    stmt.inline_params(|value| matches!(value, Value::Text(_) | Value::Raw(_)))
}

fn bind(stmt: &Statement) -> SqlxResult<Query<'_, Postgres, PgArguments>> {
    let mut query = sqlx::query(stmt.sql());
    for param in stmt.params() {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => match i32::try_from(*i) {
                Ok(small) => query.bind(small),
                Err(_) => query.bind(*i),
            },
            Value::Float(x) => query.bind(*x),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Timestamp(t) => query.bind(*t),
            Value::Uuid(u) => query.bind(*u),
            Value::Json(j) => query.bind(j),
            Value::Raw(_) => {
                return Err(DataError::UnsupportedType(
                    "raw SQL cannot be bound as a parameter".into(),
                ))
            }
        };
    }
    Ok(query)
}

/// Statements that carried literals are not cached as prepared statements.
fn prepare<'q>(
    original: &Statement,
    inlined: &'q Statement,
) -> SqlxResult<Query<'q, Postgres, PgArguments>> {
    let persistent = inlined.params().len() == original.params().len();
    Ok(bind(inlined)?.persistent(persistent))
}

#[async_trait]
impl Connection for PgConnection {
    async fn connect(url: &str, config: &SessionConfig) -> Result<Self, DataError> {
        let options = connect_options(url, config)?;
        let conn = options
            .connect()
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        info!(
            application = config.application_name.as_deref().unwrap_or(""),
            "Connected to PostgreSQL"
        );
        Ok(Self::from_sqlx(conn))
    }

    async fn fetch_all(&mut self, stmt: &Statement) -> Result<Vec<Fields>, DataError> {
        let inlined = inline_text(stmt)?;
        let query = prepare(stmt, &inlined)?;
        self.begin_if_needed().await?;
        let rows = Executor::fetch_all(&mut self.conn, query)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        debug!(rows = rows.len(), "fetched");
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&mut self, stmt: &Statement) -> Result<u64, DataError> {
        let inlined = inline_text(stmt)?;
        let query = prepare(stmt, &inlined)?;
        self.begin_if_needed().await?;
        let result = Executor::execute(&mut self.conn, query)
            .await
            .map_err(SqlxErrorExt::into_data_error)?;
        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<(), DataError> {
        self.end("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), DataError> {
        self.end("ROLLBACK").await
    }

    async fn close(self) -> Result<(), DataError> {
        self.conn.close().await.map_err(SqlxErrorExt::into_data_error)
    }
}
