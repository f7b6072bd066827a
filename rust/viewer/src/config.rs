// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Viewer configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::collab::RoomId;

/// Distance an exploded element travels from its original placement.
pub const EXPLODE_DISTANCE: f64 = 10.0;
pub const EXPLODE_DURATION: Duration = Duration::from_millis(2000);
pub const RESET_DURATION: Duration = Duration::from_millis(1000);
/// Roughly one display frame at 60 Hz.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);
pub const NAME_LOOKUP_TIMEOUT: Duration = Duration::from_millis(5000);
pub const NAME_LOOKUP_CONCURRENCY: usize = 32;

/// How an exploded element picks its travel direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DirectionPolicy {
    /// `+X, -X, +Y, -Y, +Z, -Z` by position in the element list.
    #[default]
    AxisRoundRobin,
    /// Away from the model center, through the element center.
    FromCenter,
}

impl FromStr for DirectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "axis" | "axes" | "round-robin" => Ok(DirectionPolicy::AxisRoundRobin),
            "center" | "centre" | "radial" => Ok(DirectionPolicy::FromCenter),
            other => Err(format!("unknown direction policy '{other}'")),
        }
    }
}

/// Viewer configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    /// Explode travel distance in model units.
    pub explode_distance: f64,
    /// Upper bound of the deterministic per-element distance jitter.
    pub explode_jitter: f64,
    pub explode_duration: Duration,
    pub reset_duration: Duration,
    /// Interval between animation frames.
    pub frame_interval: Duration,
    pub direction_policy: DirectionPolicy,
    /// Per-element limit on property lookups during tree construction.
    pub name_lookup_timeout: Duration,
    /// Property lookups in flight at once during tree construction.
    pub name_lookup_concurrency: usize,
    /// Collaboration room joined on mount.
    pub room: RoomId,
    /// Publish local picks to the room.
    pub broadcast_selection: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            explode_distance: EXPLODE_DISTANCE,
            explode_jitter: 0.0,
            explode_duration: EXPLODE_DURATION,
            reset_duration: RESET_DURATION,
            frame_interval: FRAME_INTERVAL,
            direction_policy: DirectionPolicy::default(),
            name_lookup_timeout: NAME_LOOKUP_TIMEOUT,
            name_lookup_concurrency: NAME_LOOKUP_CONCURRENCY,
            room: RoomId::default(),
            broadcast_selection: true,
        }
    }
}

impl ViewerConfig {
    /// Load configuration from `IFC_SHARE_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup. Unset or
    /// unparsable values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let millis = |key: &str, default: Duration| {
            parse(key).map(Duration::from_millis).unwrap_or(default)
        };

        Self {
            explode_distance: lookup("IFC_SHARE_EXPLODE_DISTANCE")
                .and_then(|v| v.trim().parse().ok())
                .filter(|d: &f64| d.is_finite())
                .unwrap_or(defaults.explode_distance),
            explode_jitter: lookup("IFC_SHARE_EXPLODE_JITTER")
                .and_then(|v| v.trim().parse().ok())
                .filter(|j: &f64| j.is_finite() && *j >= 0.0)
                .unwrap_or(defaults.explode_jitter),
            explode_duration: millis("IFC_SHARE_EXPLODE_DURATION_MS", defaults.explode_duration),
            reset_duration: millis("IFC_SHARE_RESET_DURATION_MS", defaults.reset_duration),
            frame_interval: millis("IFC_SHARE_FRAME_INTERVAL_MS", defaults.frame_interval)
                .max(Duration::from_millis(1)),
            direction_policy: lookup("IFC_SHARE_EXPLODE_DIRECTION")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.direction_policy),
            name_lookup_timeout: millis("IFC_SHARE_NAME_TIMEOUT_MS", defaults.name_lookup_timeout),
            name_lookup_concurrency: parse("IFC_SHARE_NAME_CONCURRENCY")
                .map(|n| (n as usize).max(1))
                .unwrap_or(defaults.name_lookup_concurrency),
            room: lookup("IFC_SHARE_ROOM")
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .map(RoomId::new)
                .unwrap_or(defaults.room),
            broadcast_selection: lookup("IFC_SHARE_BROADCAST")
                .map(|v| !matches!(v.trim(), "0" | "false" | "off" | "no"))
                .unwrap_or(defaults.broadcast_selection),
        }
    }
}
