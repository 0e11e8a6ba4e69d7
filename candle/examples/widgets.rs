//! Insert, update, look up and delete a widget.
//!
//! ```text
//! CREATE TABLE widgets (id serial PRIMARY KEY, name text NOT NULL, qty integer);
//! CANDLE_DATABASE_URL=postgres://localhost/shop cargo run -p candle --example widgets
//! ```

use candle::prelude::*;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), DataError> {
    candle::init_tracing();

    let config = CandleConfig::load("dev")?;
    let session = Arc::new(PgSession::from_config(&config)?);
    let widgets = PgModel::named("widgets", session.clone())?;

    let mut w = widgets.insert(fields! { "name" => "sprocket", "qty" => 3 }).await?;
    tracing::info!(id = %w["id"], "inserted");

    w.set("qty", 4)?;
    widgets.save(&mut w).await?;

    let found = widgets
        .find_where(&fields! { "name" => "sprocket" }, Joiner::And)
        .await?;
    tracing::info!(count = found.len(), "found");

    widgets.delete(&mut w).await?;
    session.close().await
}
