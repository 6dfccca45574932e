//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::util::time::{unix_millis, uptime_secs};
use crate::world::WorldKind;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allow_origin = match &state.config.client_origin {
        Some(origins) if origins.trim() != "*" => AllowOrigin::list(
            origins
                .split(',')
                .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok()),
        ),
        _ => AllowOrigin::any(),
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    server_time: u64,
    players: usize,
    tick: u64,
    world_kind: WorldKind,
    obstacles: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let world = state.sessions.world();

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        server_time: unix_millis(),
        players: state.sessions.player_count(),
        tick: state.sessions.last_tick(),
        world_kind: world.config().kind,
        obstacles: world.obstacles().len(),
    })
}
