pub mod cron;
pub mod errors;
pub mod routes;
pub mod state;
pub mod switch;
pub mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build a fully configured Router + shared state. `capacity` caps the
/// number of concurrently active rooms server-wide (`CAPACITY` at the
/// boundary, read by the binary's `main`).
pub fn build_app(capacity: usize) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(capacity));
    let switch = switch::spawn(state.clone());
    state
        .switch
        .set(switch)
        .unwrap_or_else(|_| panic!("switch initialized twice"));

    let app = Router::new()
        .route("/healthcheck/liveness", get(routes::liveness))
        .route("/game/create", get(routes::create_room))
        .route("/game/{roomID}", get(routes::ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    (app, state)
}
