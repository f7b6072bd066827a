// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC-Share Server - selection relay for collaborating viewers.
//!
//! Viewers connect over WebSocket, join a room and publish the elements they
//! pick. Every selection is forwarded to the other members of the sender's
//! rooms, never back to the sender.
//!
//! # Endpoints
//!
//! - `GET /` - API information
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/rooms` - Active rooms with member counts
//! - `GET /api/v1/rooms/:room` - Member count of one room
//! - `GET /ws` - WebSocket relay

use axum::{http::HeaderValue, routing::get, Router};
use ifc_share_viewer::collab::RoomHub;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod routes;

use config::Config;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: RoomHub,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            hub: RoomHub::new(),
            config: Arc::new(config),
        }
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.allows_any_origin() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}

/// Builds the router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config))
        .layer(TimeoutLayer::new(Duration::from_secs(
            state.config.request_timeout_secs,
        )));

    Router::new()
        // Root endpoint - API information
        .route("/", get(routes::health::info))
        // Health check
        .route("/api/v1/health", get(routes::health::check))
        // Rooms
        .route("/api/v1/rooms", get(routes::rooms::list))
        .route("/api/v1/rooms/:room", get(routes::rooms::get))
        // Relay
        .route("/ws", get(routes::ws::upgrade))
        .layer(middleware)
        .with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,ifc_share_server=debug"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).pretty().init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env();

    tracing::info!(
        port = config.port,
        default_room = %config.default_room,
        max_message_bytes = config.max_message_bytes,
        cors_origins = ?config.cors_origins,
        "Starting IFC-Share Server"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = app(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use ifc_share_viewer::collab::{Channel, RoomId};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_clients() {
        let state = AppState::new(Config::default());
        let _client = state.hub.connect();

        let (status, body) = get_json(app(state), "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "ifc-share-server");
        assert_eq!(body["clients"], 1);
    }

    #[tokio::test]
    async fn info_lists_endpoints() {
        let (status, body) = get_json(app(AppState::new(Config::default())), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["endpoints"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e["path"] == "/ws"));
    }

    #[tokio::test]
    async fn rooms_list_member_counts() {
        let state = AppState::new(Config::default());
        let (a, b) = (state.hub.connect(), state.hub.connect());
        a.join(&RoomId::default()).await.unwrap();
        b.join(&RoomId::default()).await.unwrap();

        let (status, body) = get_json(app(state.clone()), "/api/v1/rooms").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rooms"][0]["room"], "demo-project-room");
        assert_eq!(body["rooms"][0]["members"], 2);

        let (status, body) = get_json(app(state), "/api/v1/rooms/demo-project-room").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["members"], 2);
    }

    #[tokio::test]
    async fn empty_rooms_are_not_found() {
        let (status, body) = get_json(app(AppState::new(Config::default())), "/api/v1/rooms/nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn oversized_room_ids_are_rejected() {
        let uri = format!("/api/v1/rooms/{}", "r".repeat(200));
        let (status, body) = get_json(app(AppState::new(Config::default())), &uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
    }
}
