mod handlers;

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, patch, post},
    Router,
};

use crate::api::{DynAPI, API};
use crate::config::Config;
use crate::server::handlers::{drivers, rides};

pub async fn serve<T: API + Sync + Send + 'static>(api: T, config: Config) {
    let addr = config.bind_addr;

    let api = Arc::new(api) as DynAPI;
    let config = Arc::new(config);

    let app = Router::new()
        .route("/rides", post(rides::create))
        .route("/rides/open", get(rides::open))
        .route("/rides/:id", get(rides::find))
        .route("/rides/:id/events", get(rides::events))
        .route("/rides/:id/claim", patch(rides::claim))
        .route("/rides/:id/arrive", patch(rides::arrive))
        .route("/rides/:id/start", patch(rides::start))
        .route("/rides/:id/complete", patch(rides::complete))
        .route("/rides/:id/cancel", patch(rides::cancel))
        .route("/drivers/online", patch(drivers::online))
        .route("/drivers/offline", patch(drivers::offline))
        .route("/drivers/location", patch(drivers::location))
        .route("/drivers/nearby", get(drivers::nearby))
        .layer(Extension(api))
        .layer(Extension(config));

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
