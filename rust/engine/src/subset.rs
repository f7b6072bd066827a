// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subset requests and handles.
//!
//! A subset is an engine-managed sub-scene that renders a chosen set of
//! elements independently of the model's default mesh. The engine owns the
//! geometry; callers hold a [`SubsetHandle`] keyed by a generational
//! [`SubsetKey`] so a stale handle can never reach a recycled subset.

use slotmap::new_key_type;

use crate::types::{ElementId, ModelId};

new_key_type! {
    /// Arena key of a live subset inside the engine scene.
    pub struct SubsetKey;
}

/// Material applied to a subset instead of the model's own materials.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialOverride {
    /// RGB color, `0xRRGGBB`.
    pub color: u32,
    pub opacity: f32,
    pub transparent: bool,
}

/// Parameters of a `createSubset` call.
#[derive(Debug, Clone, PartialEq)]
pub struct SubsetRequest {
    pub model_id: ModelId,
    pub element_ids: Vec<ElementId>,
    pub custom_id: String,
    pub material: Option<MaterialOverride>,
    /// Replace the element set of an existing subset instead of extending it.
    pub remove_previous: bool,
}

impl SubsetRequest {
    pub fn new(
        model_id: ModelId,
        custom_id: impl Into<String>,
        element_ids: impl IntoIterator<Item = ElementId>,
    ) -> Self {
        Self {
            model_id,
            element_ids: element_ids.into_iter().collect(),
            custom_id: custom_id.into(),
            material: None,
            remove_previous: false,
        }
    }

    pub fn remove_previous(mut self, remove_previous: bool) -> Self {
        self.remove_previous = remove_previous;
        self
    }
}

/// Handle to a live subset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubsetHandle {
    pub model_id: ModelId,
    pub custom_id: String,
    pub key: SubsetKey,
}
