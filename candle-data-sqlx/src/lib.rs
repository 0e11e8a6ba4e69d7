//! # candle-data-sqlx — PostgreSQL backend for Candle
//!
//! Implements [`candle_data::Connection`] over a single
//! [SQLx](https://github.com/launchbadge/sqlx) PostgreSQL connection. It depends
//! on [`candle-data`] for the session, model and entity types, and adds the
//! driver binding, row decoding and error bridging needed to talk to a real
//! database.
//!
//! # What's in this crate
//!
//! | Type | Description |
//! |------|-------------|
//! | [`PgConnection`] | `Connection` impl with implicit `BEGIN` and explicit `COMMIT` / `ROLLBACK` |
//! | [`PgSession`] / [`PgModel`] | `Session` and `Model` over [`PgConnection`] |
//! | [`connect_options`] | `PgConnectOptions` from a URL and a `SessionConfig` |
//! | [`SqlxErrorExt`] | Extension trait to convert `sqlx::Error` → `DataError` (`.into_data_error()`) |
//! | [`SqlxResult<T>`] | Type alias for `Result<T, DataError>` |
//!
//! # Quick start
//!
//! ```ignore
//! use candle_data_sqlx::prelude::*;
//! use std::sync::Arc;
//!
//! let session = Arc::new(PgSession::new());
//! session.set_connection_string("postgres://localhost/shop").await?;
//!
//! let widgets = PgModel::named("widgets", session.clone())?;
//! let w = widgets.insert(fields! { "name" => "a" }).await?;
//! ```
//!
//! # Types
//!
//! | PostgreSQL | [`Value`](candle_data::Value) |
//! |------------|-------|
//! | `bool` | `Bool` |
//! | `int2`, `int4`, `int8`, `oid` | `Int` |
//! | `float4`, `float8`, `numeric` | `Float` |
//! | `text`, `varchar`, `name`, `bpchar`, `"char"`, enums | `Text` |
//! | `time`, `interval`, `inet`, `cidr` | `Text` in the server's output form |
//! | `bytea` | `Text` in hex form (`\x...`) |
//! | `timestamptz`, `timestamp`, `date` | `Timestamp` (naive values read as UTC) |
//! | `uuid` | `Uuid` |
//! | `json`, `jsonb` | `Json` |
//!
//! Columns of other types (arrays, ranges, composites, ...) are left out of
//! the decoded row; cast them in the query, a routine or a view to read them.
//!
//! Text parameters are sent as quoted literals, so the server coerces them
//! into whatever the target column is (`date`, enums, `inet`, ...). Integers
//! are bound as `int4` when they fit and as `int8` otherwise.

pub mod connection;
pub mod decode;
pub mod error;

pub use connection::{connect_options, PgConnection};
pub use error::{SqlxErrorExt, SqlxResult};

/// A [`Session`](candle_data::Session) over PostgreSQL.
pub type PgSession = candle_data::Session<PgConnection>;

/// A [`Model`](candle_data::Model) over PostgreSQL.
pub type PgModel = candle_data::Model<PgConnection>;

/// Re-exports of the most commonly used types from both `candle-data` and this crate.
pub mod prelude {
    pub use crate::{PgConnection, PgModel, PgSession, SqlxErrorExt};
    pub use candle_data::prelude::*;
}
