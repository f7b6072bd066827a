// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for viewer operations.

use crate::collab::ChannelError;

/// Result type alias for viewer operations.
pub type Result<T> = std::result::Result<T, ViewerError>;

/// Errors surfaced by the viewer core.
///
/// Most per-element failures never reach this type: they are logged and
/// skipped where they happen. What remains are failures that stop a whole
/// operation.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error(transparent)]
    Engine(#[from] ifc_share_engine::Error),

    #[error("no model is loaded")]
    NoModel,

    #[error("viewer session has been unmounted")]
    Unmounted,

    #[error("collaboration channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}
