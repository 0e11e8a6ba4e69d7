//! Shared connection handle with commit/rollback control.
//!
//! A [`Session`] owns at most one connection. Every operation borrows it
//! through a [`Cursor`], which holds the session lock until dropped, so the
//! statements of one operation and its commit never interleave with another
//! task's work on the same session.

use crate::config::{CandleConfig, SessionConfig};
use crate::connection::Connection;
use crate::error::DataError;
use crate::query::Statement;
use crate::routine::RoutineRegistry;
use crate::value::Fields;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// What a session is configured with.
pub enum Target<C> {
    /// A live connection, used as-is.
    Connection(C),
    /// A connection string, connected lazily on first cursor.
    Url(String),
}

struct Inner<C> {
    conn: Option<C>,
    url: Option<String>,
}

impl<C> Inner<C> {
    fn is_configured(&self) -> bool {
        self.conn.is_some() || self.url.is_some()
    }
}

/// Process- or worker-wide handle to one database connection.
///
/// Share it between models with `Arc<Session<C>>`.
///
/// # Example
///
/// ```ignore
/// let session = Arc::new(Session::<PgConnection>::new());
/// session.set_connection_string("postgres://localhost/shop").await?;
/// let widgets = Model::named("widgets", session.clone())?;
/// ```
pub struct Session<C: Connection> {
    inner: Mutex<Inner<C>>,
    config: SessionConfig,
    routines: RoutineRegistry,
}

impl<C: Connection> Session<C> {
    /// An unconfigured session with default settings.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// A session using `config`; a configured URL becomes the deferred
    /// connection string.
    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                conn: None,
                url: config.url.clone(),
            }),
            config,
            routines: RoutineRegistry::new(),
        }
    }

    /// Build a session from `candle.*` keys of a loaded config.
    pub fn from_config(config: &CandleConfig) -> Result<Self, DataError> {
        Ok(Self::with_config(SessionConfig::from_config(config)?))
    }

    /// A session that already holds a live connection.
    pub fn with_connection(conn: C) -> Self {
        Self {
            inner: Mutex::new(Inner {
                conn: Some(conn),
                url: None,
            }),
            config: SessionConfig::default(),
            routines: RoutineRegistry::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Routine names known to exist in this session's database.
    pub fn routines(&self) -> &RoutineRegistry {
        &self.routines
    }

    pub async fn set_connection(&self, conn: C) -> Result<(), DataError> {
        self.configure(Target::Connection(conn)).await
    }

    pub async fn set_connection_string(&self, url: impl Into<String>) -> Result<(), DataError> {
        self.configure(Target::Url(url.into())).await
    }

    /// Store a connection or a deferred connection string.
    ///
    /// A previous connection is rolled back and closed first.
    ///
    /// # Errors
    ///
    /// `AlreadyConfigured` when the session was configured before and
    /// `allow_reconfigure` is off.
    pub async fn configure(&self, target: Target<C>) -> Result<(), DataError> {
        let mut inner = self.inner.lock().await;
        if inner.is_configured() && !self.config.allow_reconfigure {
            return Err(DataError::AlreadyConfigured);
        }
        if let Some(old) = inner.conn.take() {
            info!("Session reconfigured, closing previous connection");
            release(old).await;
        }
        match target {
            Target::Connection(conn) => {
                inner.conn = Some(conn);
                inner.url = None;
            }
            Target::Url(url) => {
                inner.url = Some(url);
            }
        }
        self.routines.clear();
        Ok(())
    }

    /// Exclusive access to the connection, connecting first if only a
    /// connection string is known.
    ///
    /// # Errors
    ///
    /// `NotConfigured` if neither a connection nor a string was provided;
    /// driver errors from connecting.
    pub async fn cursor(&self) -> Result<Cursor<'_, C>, DataError> {
        let mut inner = self.inner.lock().await;
        if inner.conn.is_none() {
            let url = inner.url.clone().ok_or(DataError::NotConfigured)?;
            info!("Opening session connection");
            inner.conn = Some(C::connect(&url, &self.config).await?);
        }
        Ok(Cursor { inner })
    }

    /// Establish the connection now instead of on first use.
    pub async fn connect(&self) -> Result<(), DataError> {
        self.cursor().await.map(drop)
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.conn.is_some()
    }

    /// Commit the whole connection's open transaction.
    ///
    /// A no-op when nothing has connected yet.
    pub async fn commit(&self) -> Result<(), DataError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        match inner.conn.as_mut() {
            Some(conn) => {
                debug!("commit");
                conn.commit().await
            }
            None if inner.url.is_some() => Ok(()),
            None => Err(DataError::NotConfigured),
        }
    }

    pub async fn rollback(&self) -> Result<(), DataError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        match inner.conn.as_mut() {
            Some(conn) => {
                debug!("rollback");
                conn.rollback().await
            }
            None if inner.url.is_some() => Ok(()),
            None => Err(DataError::NotConfigured),
        }
    }

    /// Roll back and close the connection. A known connection string is
    /// kept, so the next cursor reconnects.
    pub async fn close(&self) -> Result<(), DataError> {
        let mut inner = self.inner.lock().await;
        if let Some(mut conn) = inner.conn.take() {
            conn.rollback().await?;
            conn.close().await?;
        }
        Ok(())
    }
}

impl<C: Connection> Default for Session<C> {
    fn default() -> Self {
        Self::new()
    }
}

async fn release<C: Connection>(mut conn: C) {
    if let Err(err) = conn.rollback().await {
        warn!(error = %err, "Rollback of previous connection failed");
    }
    if let Err(err) = conn.close().await {
        warn!(error = %err, "Closing previous connection failed");
    }
}

/// Exclusive, lock-holding view of a session's connection.
pub struct Cursor<'a, C: Connection> {
    inner: MutexGuard<'a, Inner<C>>,
}

impl<C: Connection> Cursor<'_, C> {
    fn conn(&mut self) -> Result<&mut C, DataError> {
        self.inner.conn.as_mut().ok_or(DataError::NotConfigured)
    }

    pub async fn fetch_all(&mut self, stmt: &Statement) -> Result<Vec<Fields>, DataError> {
        debug!(sql = %stmt, params = stmt.params().len(), "fetch_all");
        self.conn()?.fetch_all(stmt).await
    }

    pub async fn fetch_optional(&mut self, stmt: &Statement) -> Result<Option<Fields>, DataError> {
        debug!(sql = %stmt, params = stmt.params().len(), "fetch_optional");
        self.conn()?.fetch_optional(stmt).await
    }

    pub async fn execute(&mut self, stmt: &Statement) -> Result<u64, DataError> {
        debug!(sql = %stmt, params = stmt.params().len(), "execute");
        self.conn()?.execute(stmt).await
    }

    pub async fn commit(&mut self) -> Result<(), DataError> {
        debug!("commit");
        self.conn()?.commit().await
    }

    pub async fn rollback(&mut self) -> Result<(), DataError> {
        debug!("rollback");
        self.conn()?.rollback().await
    }
}
