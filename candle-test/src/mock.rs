use async_trait::async_trait;
use candle_data::{Connection, DataError, Fields, SessionConfig, Statement};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// A scripted answer to the next statement.
#[derive(Debug, Clone)]
pub enum Reply {
    Rows(Vec<Fields>),
    Affected(u64),
    Error(String),
}

/// Error returned for a scripted [`Reply::Error`] or a refused connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockError(pub String);

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for MockError {}

#[derive(Debug, Default)]
struct State {
    replies: VecDeque<Reply>,
    statements: Vec<Statement>,
    commits: usize,
    rollbacks: usize,
    closed: bool,
    connected_with: Option<SessionConfig>,
}

/// In-memory [`Connection`] that replays scripted replies and records every
/// statement it receives.
///
/// Clones share state, so a test can keep a handle after moving the
/// connection into a session:
///
/// ```ignore
/// let mock = MockConnection::new();
/// mock.push_rows(vec![fields! { "id" => 1, "name" => "a" }]);
/// let session = Arc::new(Session::with_connection(mock.clone()));
/// // ... run model operations ...
/// assert_eq!(mock.commits(), 1);
/// ```
///
/// A statement with no scripted reply returns no rows and affects none.
#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    state: Arc<Mutex<State>>,
}

static REGISTRY: OnceLock<Mutex<HashMap<String, MockConnection>>> = OnceLock::new();

fn registry() -> MutexGuard<'static, HashMap<String, MockConnection>> {
    REGISTRY
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `Connection::connect(url, ..)` hand out this connection.
    ///
    /// Use a distinct URL per test; connecting to an unregistered URL fails.
    pub fn register(&self, url: &str) {
        registry().insert(url.to_string(), self.clone());
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, reply: Reply) -> &Self {
        self.state().replies.push_back(reply);
        self
    }

    pub fn push_rows(&self, rows: Vec<Fields>) -> &Self {
        self.push(Reply::Rows(rows))
    }

    pub fn push_row(&self, row: Fields) -> &Self {
        self.push(Reply::Rows(vec![row]))
    }

    pub fn push_empty(&self) -> &Self {
        self.push(Reply::Rows(Vec::new()))
    }

    pub fn push_affected(&self, rows: u64) -> &Self {
        self.push(Reply::Affected(rows))
    }

    pub fn push_error(&self, message: &str) -> &Self {
        self.push(Reply::Error(message.to_string()))
    }

    /// Every statement received so far, in order.
    pub fn statements(&self) -> Vec<Statement> {
        self.state().statements.clone()
    }

    pub fn last_statement(&self) -> Option<Statement> {
        self.state().statements.last().cloned()
    }

    pub fn statement_count(&self) -> usize {
        self.state().statements.len()
    }

    pub fn commits(&self) -> usize {
        self.state().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.state().rollbacks
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Settings passed to `connect`, if this mock was connected by URL.
    pub fn connected_with(&self) -> Option<SessionConfig> {
        self.state().connected_with.clone()
    }

    pub fn pending_replies(&self) -> usize {
        self.state().replies.len()
    }

    fn next_reply(&self, stmt: &Statement) -> Reply {
        let mut state = self.state();
        state.statements.push(stmt.clone());
        state
            .replies
            .pop_front()
            .unwrap_or(Reply::Rows(Vec::new()))
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn connect(url: &str, config: &SessionConfig) -> Result<Self, DataError> {
        let mock = registry()
            .get(url)
            .cloned()
            .ok_or_else(|| DataError::database(MockError(format!("connection refused: {url}"))))?;
        mock.state().connected_with = Some(config.clone());
        Ok(mock)
    }

    async fn fetch_all(&mut self, stmt: &Statement) -> Result<Vec<Fields>, DataError> {
        match self.next_reply(stmt) {
            Reply::Rows(rows) => Ok(rows),
            Reply::Affected(_) => Ok(Vec::new()),
            Reply::Error(message) => Err(DataError::database(MockError(message))),
        }
    }

    async fn execute(&mut self, stmt: &Statement) -> Result<u64, DataError> {
        match self.next_reply(stmt) {
            Reply::Rows(rows) => Ok(rows.len() as u64),
            Reply::Affected(n) => Ok(n),
            Reply::Error(message) => Err(DataError::database(MockError(message))),
        }
    }

    async fn commit(&mut self) -> Result<(), DataError> {
        self.state().commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DataError> {
        self.state().rollbacks += 1;
        Ok(())
    }

    async fn close(self) -> Result<(), DataError> {
        self.state().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_data::{fields, Value};

    #[tokio::test]
    async fn test_replies_in_order_and_records_statements() {
        let mut mock = MockConnection::new();
        mock.push_row(fields! { "id" => 1 }).push_affected(3);

        let select = Statement::new("SELECT 1", Vec::new());
        let delete = Statement::new("DELETE FROM t", Vec::new());
        let rows = mock.fetch_all(&select).await.unwrap();
        assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(mock.execute(&delete).await.unwrap(), 3);
        assert!(mock.fetch_all(&select).await.unwrap().is_empty());

        assert_eq!(mock.statement_count(), 3);
        assert_eq!(mock.statements()[1], delete);
    }

    #[tokio::test]
    async fn test_scripted_error() {
        let mut mock = MockConnection::new();
        mock.push_error("duplicate key");
        let err = mock
            .fetch_all(&Statement::new("INSERT", Vec::new()))
            .await
            .unwrap_err();
        assert!(err.is_database());
        assert_eq!(err.to_string(), "Database error: duplicate key");
    }

    #[tokio::test]
    async fn test_connect_uses_registry() {
        let mock = MockConnection::new();
        mock.register("mock://registry-test");
        let config = SessionConfig::default().with_application_name("tests");
        let conn = MockConnection::connect("mock://registry-test", &config)
            .await
            .unwrap();
        assert_eq!(
            mock.connected_with().unwrap().application_name.as_deref(),
            Some("tests")
        );
        conn.close().await.unwrap();
        assert!(mock.is_closed());

        assert!(MockConnection::connect("mock://nowhere", &config).await.is_err());
    }
}
