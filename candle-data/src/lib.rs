//! # candle-data — active-record core
//!
//! Rows of a table as mutable, dictionary-like [`Entity`] values, with the
//! CRUD protocol issued by a [`Model`] over a shared [`Session`]. The database
//! itself is reached through the [`Connection`] trait; see `candle-data-sqlx`
//! for the PostgreSQL backend.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Value`] / [`RawValue`] | Column values; raw values are emitted into SQL verbatim |
//! | [`adapt`] | Value → PostgreSQL literal text |
//! | [`Statement`] | SQL text plus bound parameters |
//! | [`Table`] / [`Entity`] | Table descriptor and one row of it |
//! | [`Session`] / [`Cursor`] | Shared connection, commit and rollback |
//! | [`WriteOptions`] | Commit policy of `insert` / `save` / `delete` |
//! | [`Model`] | Insert, save, delete, get, get_many, find_where, exists, fields |
//! | [`Routine`] | Stored routine discovered through the catalog |
//! | [`CandleConfig`] / [`SessionConfig`] | YAML + env configuration |

pub mod commit;
pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod memo;
pub mod model;
pub mod query;
pub mod routine;
pub mod session;
pub mod value;

pub use commit::WriteOptions;
pub use config::{CandleConfig, ConfigError, SessionConfig};
pub use connection::Connection;
pub use entity::{Entity, Table};
pub use error::{DataError, DataResult};
pub use memo::Memo;
pub use model::{Lookup, Model};
pub use query::{Joiner, Statement};
pub use routine::{Routine, RoutineRegistry};
pub use session::{Cursor, Session, Target};
pub use value::{adapt, Fields, RawValue, Value};

pub mod prelude {
    //! Re-exports of the most commonly used data types.
    pub use crate::{
        fields, Connection, DataError, Entity, Fields, Joiner, Model, RawValue, Session, Table,
        Value, WriteOptions,
    };
}
