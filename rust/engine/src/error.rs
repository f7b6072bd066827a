// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for engine calls.

use crate::types::{ElementId, ModelId};

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by an [`Engine`](crate::Engine) implementation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The model id does not refer to a loaded model.
    #[error("model {0} is not loaded")]
    ModelNotFound(ModelId),

    /// The element does not exist in the given model.
    #[error("element {element} not found in model {model}")]
    ElementNotFound { model: ModelId, element: ElementId },

    /// No live subset exists under the given custom id.
    #[error("subset '{0}' not found")]
    SubsetNotFound(String),

    /// The model source could not be loaded.
    #[error("failed to load model: {0}")]
    Load(String),

    /// The engine was disposed and no longer owns a scene.
    #[error("engine has been disposed")]
    Disposed,

    /// Any other backend failure (WASM trap, GPU loss, ...).
    #[error("engine backend error: {0}")]
    Backend(String),
}
