// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The engine interface consumed by the viewer core.

use async_trait::async_trait;
use nalgebra::Vector3;

use crate::error::Result;
use crate::properties::PropertyBag;
use crate::spatial::RawSpatialNode;
use crate::subset::{SubsetHandle, SubsetRequest};
use crate::types::{Bounds, ElementId, ModelId, ModelSource, PickResult};

/// A 3D engine holding loaded IFC models and their scene.
///
/// Calls that may hit the model database or the GPU are `async`. Cheap scene
/// mutations (visibility, transforms) are synchronous so the animator can
/// drive them once per frame.
#[async_trait]
pub trait Engine: Send + Sync {
    // --- Models ---

    /// Loads a model and returns its id.
    async fn load_model(&self, source: &ModelSource) -> Result<ModelId>;

    /// Returns the spatial containment structure of a loaded model.
    async fn spatial_structure(&self, model: ModelId) -> Result<RawSpatialNode>;

    /// Returns the property record of one element.
    async fn item_properties(&self, model: ModelId, element: ElementId) -> Result<PropertyBag>;

    /// Every element id present in the model's default mesh, in geometry order.
    async fn all_element_ids(&self, model: ModelId) -> Result<Vec<ElementId>>;

    // --- Picking ---

    /// Ray-picks at the current pointer position.
    async fn pick(&self) -> Result<Option<PickResult>>;

    /// Clears the pick highlight.
    async fn unpick(&self) -> Result<()>;

    /// Highlights elements without touching their geometry.
    async fn highlight(
        &self,
        model: ModelId,
        elements: &[ElementId],
        additive: bool,
        clear_previous: bool,
    ) -> Result<()>;

    // --- Subsets ---

    /// Creates (or extends, see [`SubsetRequest::remove_previous`]) a subset.
    ///
    /// Returns `None` when the engine produced no geometry for the request.
    async fn create_subset(&self, request: SubsetRequest) -> Result<Option<SubsetHandle>>;

    /// Looks up the live subset registered under `custom_id`.
    fn subset(&self, model: ModelId, custom_id: &str) -> Option<SubsetHandle>;

    /// Detaches a subset from the scene and frees it. Returns `false` when no
    /// such subset was live.
    fn remove_subset(&self, model: ModelId, custom_id: &str) -> Result<bool>;

    /// Adds a subset to the rendered scene.
    fn attach_subset(&self, handle: &SubsetHandle) -> Result<()>;

    fn set_subset_visible(&self, handle: &SubsetHandle, visible: bool) -> Result<()>;

    /// Sets the subset's translation relative to its original placement.
    fn set_subset_offset(&self, handle: &SubsetHandle, offset: Vector3<f64>) -> Result<()>;

    fn subset_offset(&self, handle: &SubsetHandle) -> Result<Vector3<f64>>;

    // --- Default mesh ---

    fn set_model_visible(&self, model: ModelId, visible: bool) -> Result<()>;

    fn model_visible(&self, model: ModelId) -> Result<bool>;

    /// Bounding box of the whole model, `None` for a model without geometry.
    fn model_bounds(&self, model: ModelId) -> Result<Option<Bounds>>;

    /// Bounding box of one element, `None` when it has no geometry.
    fn element_bounds(&self, model: ModelId, element: ElementId) -> Result<Option<Bounds>>;

    /// Releases every model and GPU resource. Later calls fail with
    /// [`Error::Disposed`](crate::Error::Disposed).
    async fn dispose(&self);
}
