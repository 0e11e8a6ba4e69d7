//! Candle — rows of a PostgreSQL table as mutable, dictionary-like entities.
//!
//! This facade crate re-exports the Candle sub-crates through a single
//! dependency with feature flags. Import everything you need with:
//!
//! ```ignore
//! use candle::prelude::*;
//! ```
//!
//! # Feature flags
//!
//! | Feature          | Default | Crate                               |
//! |------------------|---------|-------------------------------------|
//! | `postgres`       | **yes** | `candle-data-sqlx`                  |
//! | `tls-rustls`     | no      | `candle-data-sqlx/tls-rustls`       |
//! | `tls-native-tls` | no      | `candle-data-sqlx/tls-native-tls`   |
//! | `test-utils`     | no      | `candle-test` (`MockConnection`)    |
//!
//! `candle-data` (entities, models, sessions, config) is always available.

use tracing_subscriber::EnvFilter;

pub use candle_data;
pub use candle_data::*;

#[cfg(feature = "postgres")]
pub use candle_data_sqlx;

#[cfg(feature = "postgres")]
pub use candle_data_sqlx::{PgConnection, PgModel, PgSession};

#[cfg(feature = "test-utils")]
pub use candle_test;

/// Initialise the global `tracing` subscriber with a standard `fmt` layer.
///
/// Respects the `RUST_LOG` environment variable. Falls back to
/// `info,candle_data=debug` when `RUST_LOG` is not set, which logs every
/// statement with its literal parameters.
///
/// Call this once, at the very start of `main`, before any tracing macro.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,candle_data=debug")),
        )
        .init();
}

/// Unified prelude — import everything with `use candle::prelude::*`.
pub mod prelude {
    pub use candle_data::prelude::*;
    pub use candle_data::{CandleConfig, Lookup, SessionConfig};

    #[cfg(feature = "postgres")]
    pub use candle_data_sqlx::prelude::*;

    #[cfg(feature = "test-utils")]
    pub use candle_test::MockConnection;
}
