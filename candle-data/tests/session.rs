use candle_data::prelude::*;
use candle_data::SessionConfig;
use candle_test::MockConnection;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_unconfigured_session() {
    let session = Session::<MockConnection>::new();
    assert!(matches!(session.cursor().await, Err(DataError::NotConfigured)));
    assert!(matches!(session.commit().await, Err(DataError::NotConfigured)));
    assert!(!session.is_connected().await);
}

#[tokio::test]
async fn test_connection_string_connects_lazily() {
    let mock = MockConnection::new();
    mock.register("mock://session/lazy");
    let config = SessionConfig::default()
        .with_statement_timeout(Duration::from_millis(1500))
        .with_application_name("inventory");
    let session = Arc::new(Session::<MockConnection>::with_config(config));
    session.set_connection_string("mock://session/lazy").await.unwrap();

    // nothing to commit before the first statement
    session.commit().await.unwrap();
    assert!(!session.is_connected().await);
    assert_eq!(mock.commits(), 0);

    let widgets = Model::named("widgets", session.clone()).unwrap();
    mock.push_empty();
    assert!(widgets.get(1).await.unwrap().is_none());
    assert!(session.is_connected().await);

    let used = mock.connected_with().unwrap();
    assert_eq!(used.statement_timeout, Some(Duration::from_millis(1500)));
    assert_eq!(used.application_name.as_deref(), Some("inventory"));
}

#[tokio::test]
async fn test_failed_connect_is_reported() {
    let session = Session::<MockConnection>::new();
    session.set_connection_string("mock://session/unregistered").await.unwrap();
    let err = session.connect().await.unwrap_err();
    assert!(err.is_database());
    assert!(!session.is_connected().await);
}

#[tokio::test]
async fn test_reconfigure_releases_previous_connection() {
    let first = MockConnection::new();
    let second = MockConnection::new();
    let session = Session::with_connection(first.clone());
    session.routines().remember("top_widgets");

    session.set_connection(second.clone()).await.unwrap();
    assert_eq!(first.rollbacks(), 1);
    assert!(first.is_closed());
    assert!(!second.is_closed());
    assert!(session.routines().is_empty());

    session.commit().await.unwrap();
    assert_eq!(second.commits(), 1);
    assert_eq!(first.commits(), 0);
}

#[tokio::test]
async fn test_single_configuration_refuses_second_target() {
    let config = SessionConfig::default().single_configuration();
    let session = Session::<MockConnection>::with_config(config);
    session.set_connection(MockConnection::new()).await.unwrap();

    let other = MockConnection::new();
    assert!(matches!(
        session.set_connection(other.clone()).await,
        Err(DataError::AlreadyConfigured)
    ));
    assert!(matches!(
        session.set_connection_string("mock://session/other").await,
        Err(DataError::AlreadyConfigured)
    ));
    assert!(!other.is_closed());
}

#[tokio::test]
async fn test_close_keeps_connection_string() {
    let mock = MockConnection::new();
    mock.register("mock://session/close");
    let session = Session::<MockConnection>::new();
    session.set_connection_string("mock://session/close").await.unwrap();
    session.connect().await.unwrap();

    session.close().await.unwrap();
    assert!(mock.is_closed());
    assert_eq!(mock.rollbacks(), 1);
    assert!(!session.is_connected().await);

    session.connect().await.unwrap();
    assert!(session.is_connected().await);
}

#[tokio::test]
async fn test_rollback_discards_uncommitted_write() {
    let mock = MockConnection::new();
    let session = Arc::new(Session::with_connection(mock.clone()));
    let widgets = Model::named("widgets", session.clone()).unwrap();

    mock.push_row(fields! { "id" => 1, "name" => "draft" });
    widgets
        .insert_with(fields! { "name" => "draft" }, WriteOptions::no_commit())
        .await
        .unwrap();
    session.rollback().await.unwrap();

    assert_eq!(mock.commits(), 0);
    assert_eq!(mock.rollbacks(), 1);
}
