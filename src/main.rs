use std::sync::Arc;

use kenda_dispatch::config::Config;
use kenda_dispatch::engine::Engine;
use kenda_dispatch::server::serve;
use kenda_dispatch::store::PgStore;

#[tokio::main]
async fn main() {
    let config = Config::load().unwrap();

    tracing_subscriber::fmt()
        .with_env_filter(config.log_filter.clone())
        .init();

    let store = PgStore::connect(&config.database_url, config.max_connections)
        .await
        .unwrap();

    let engine = Engine::new(Arc::new(store));

    serve(engine, config).await;
}
