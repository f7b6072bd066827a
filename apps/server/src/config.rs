// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Server configuration loaded from environment variables.

use ifc_share_viewer::collab::{RoomId, DEFAULT_ROOM};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on.
    pub port: u16,
    /// Room joined by a `join-room` frame without a room id.
    pub default_room: RoomId,
    /// Largest accepted WebSocket frame, in bytes.
    pub max_message_bytes: usize,
    /// Request timeout in seconds (HTTP routes and WebSocket handshakes).
    pub request_timeout_secs: u64,
    /// Allowed CORS origins (comma-separated, or "*" for all).
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3002,
            default_room: RoomId::new(DEFAULT_ROOM),
            max_message_bytes: 64 * 1024,
            request_timeout_secs: 30,
            cors_origins: vec!["*".into()],
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            default_room: std::env::var("DEFAULT_ROOM")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(RoomId::new)
                .unwrap_or(defaults.default_room),
            max_message_bytes: std::env::var("MAX_MESSAGE_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_message_bytes),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.request_timeout_secs),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|v| parse_origins(&v))
                .ok()
                .filter(|origins| !origins.is_empty())
                .unwrap_or(defaults.cors_origins),
        }
    }

    /// Whether any origin may connect.
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }
}

fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
