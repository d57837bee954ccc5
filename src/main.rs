//! This file defines the cubist binary entry point.

use cubist::app;
use cubist::app_state;
use cubist::cli;
use cubist::metrics;
use cubist::server;
use cubist::tracing;

use std::sync::Arc;

/// Application entry point
#[tokio::main]
async fn main() {
    let args = cli::parse();
    tracing::init_tracing();
    metrics::register_metrics();
    let state = Arc::new(app_state::AppState::new(&args));
    let app = app::router(state);
    server::serve(&args, app).await;
}
