// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Headless in-memory engine.
//!
//! [`MemoryEngine`] keeps a catalog of pre-registered models and a scene arena
//! of subsets. It renders nothing, but it tracks everything a renderer would
//! show (default mesh visibility, attached subsets, their offsets, highlights),
//! so viewer logic can run and be inspected without a GPU. Latency and
//! per-element failures can be injected to exercise the viewer's async paths.

use async_trait::async_trait;
use nalgebra::Vector3;
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::properties::{PropertyBag, PropertyValue};
use crate::spatial::RawSpatialNode;
use crate::subset::{MaterialOverride, SubsetHandle, SubsetKey, SubsetRequest};
use crate::types::{Bounds, ElementId, ModelId, ModelSource, PickResult};

/// One element of an in-memory model.
#[derive(Debug, Clone)]
pub struct MemoryElement {
    pub id: ElementId,
    pub type_name: String,
    pub name: Option<String>,
    pub bounds: Option<Bounds>,
    /// Extra properties merged into the element's property record.
    pub properties: PropertyBag,
}

impl MemoryElement {
    pub fn new(id: impl Into<ElementId>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            name: None,
            bounds: None,
            properties: PropertyBag::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key, value);
        self
    }

    /// The record an IFC engine would report: `expressID`, `type`, `Name`
    /// and any extra properties. There is no `id` key.
    fn record(&self) -> PropertyBag {
        let mut bag = self.properties.clone();
        bag.insert("expressID", PropertyValue::Integer(i64::from(self.id.0)));
        bag.insert("type", PropertyValue::text(self.type_name.clone()));
        if let Some(name) = &self.name {
            bag.insert("Name", PropertyValue::label(name.clone()));
        }
        bag
    }
}

/// A model that [`MemoryEngine`] can load.
#[derive(Debug, Clone, Default)]
pub struct MemoryModel {
    elements: Vec<MemoryElement>,
    structure: Option<RawSpatialNode>,
}

impl MemoryModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an element. Insertion order is the geometry order.
    pub fn element(mut self, element: MemoryElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Sets an explicit spatial structure. Without one, every element hangs
    /// directly under an `IFCPROJECT` root.
    pub fn structure(mut self, structure: RawSpatialNode) -> Self {
        self.structure = Some(structure);
        self
    }

    pub fn elements(&self) -> &[MemoryElement] {
        &self.elements
    }

    fn find(&self, id: ElementId) -> Option<&MemoryElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    fn spatial_structure(&self) -> RawSpatialNode {
        match &self.structure {
            Some(structure) => structure.clone(),
            None => RawSpatialNode::new("IFCPROJECT").with_children(
                self.elements
                    .iter()
                    .map(|e| RawSpatialNode::element(e.type_name.clone(), e.id)),
            ),
        }
    }

    fn bounds(&self) -> Option<Bounds> {
        Bounds::union_all(self.elements.iter().filter_map(|e| e.bounds.as_ref()))
    }
}

/// A recorded `highlight` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightCall {
    pub model_id: ModelId,
    pub elements: Vec<ElementId>,
    pub additive: bool,
    pub clear_previous: bool,
}

/// Observable state of one live subset.
#[derive(Debug, Clone, PartialEq)]
pub struct SubsetSnapshot {
    pub custom_id: String,
    pub element_ids: Vec<ElementId>,
    pub attached: bool,
    pub visible: bool,
    pub offset: Vector3<f64>,
    pub material: Option<MaterialOverride>,
}

#[derive(Debug)]
struct SubsetData {
    model_id: ModelId,
    custom_id: String,
    element_ids: Vec<ElementId>,
    material: Option<MaterialOverride>,
    attached: bool,
    visible: bool,
    offset: Vector3<f64>,
}

impl SubsetData {
    fn snapshot(&self) -> SubsetSnapshot {
        SubsetSnapshot {
            custom_id: self.custom_id.clone(),
            element_ids: self.element_ids.clone(),
            attached: self.attached,
            visible: self.visible,
            offset: self.offset,
            material: self.material,
        }
    }
}

#[derive(Debug)]
struct LoadedModel {
    model: MemoryModel,
    visible: bool,
}

#[derive(Debug, Default)]
struct Scene {
    catalog: FxHashMap<String, MemoryModel>,
    models: FxHashMap<ModelId, LoadedModel>,
    next_model: u32,

    subsets: SlotMap<SubsetKey, SubsetData>,
    by_custom_id: FxHashMap<(ModelId, String), SubsetKey>,

    pick_target: Option<PickResult>,
    picked: Option<PickResult>,
    highlights: Vec<HighlightCall>,

    latency: Duration,
    failing_properties: FxHashSet<ElementId>,
    failing_subsets: FxHashSet<ElementId>,
    fail_highlight: bool,
    redundant_creates: usize,
    disposed: bool,
}

impl Scene {
    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    fn model(&self, id: ModelId) -> Result<&LoadedModel> {
        self.ensure_live()?;
        self.models.get(&id).ok_or(Error::ModelNotFound(id))
    }

    fn model_mut(&mut self, id: ModelId) -> Result<&mut LoadedModel> {
        self.ensure_live()?;
        self.models.get_mut(&id).ok_or(Error::ModelNotFound(id))
    }

    fn subset_mut(&mut self, handle: &SubsetHandle) -> Result<&mut SubsetData> {
        self.ensure_live()?;
        match self.subsets.get_mut(handle.key) {
            Some(data) if data.model_id == handle.model_id && data.custom_id == handle.custom_id => {
                Ok(data)
            }
            _ => Err(Error::SubsetNotFound(handle.custom_id.clone())),
        }
    }

    fn handle(&self, key: SubsetKey) -> Option<SubsetHandle> {
        self.subsets.get(key).map(|data| SubsetHandle {
            model_id: data.model_id,
            custom_id: data.custom_id.clone(),
            key,
        })
    }
}

/// In-memory [`Engine`] implementation.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    scene: Mutex<Scene>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn scene(&self) -> MutexGuard<'_, Scene> {
        self.scene.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self) {
        let latency = self.scene().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    // --- Setup ---

    /// Makes a model loadable under a URL or file name.
    pub fn register(&self, source: impl Into<String>, model: MemoryModel) {
        self.scene().catalog.insert(source.into(), model);
    }

    /// Delay applied to every async call.
    pub fn set_latency(&self, latency: Duration) {
        self.scene().latency = latency;
    }

    /// What the next `pick` will hit.
    pub fn set_pick_target(&self, target: Option<PickResult>) {
        self.scene().pick_target = target;
    }

    /// Makes property lookups for `element` fail.
    pub fn fail_properties(&self, element: impl Into<ElementId>) {
        self.scene().failing_properties.insert(element.into());
    }

    /// Makes subset creation fail for any request containing `element`.
    pub fn fail_subset(&self, element: impl Into<ElementId>) {
        self.scene().failing_subsets.insert(element.into());
    }

    pub fn fail_highlight(&self, fail: bool) {
        self.scene().fail_highlight = fail;
    }

    // --- Inspection ---

    pub fn picked(&self) -> Option<PickResult> {
        self.scene().picked
    }

    pub fn highlight_calls(&self) -> Vec<HighlightCall> {
        self.scene().highlights.clone()
    }

    /// Live subsets of a model, sorted by custom id.
    pub fn live_subsets(&self, model: ModelId) -> Vec<SubsetSnapshot> {
        let scene = self.scene();
        let mut live: Vec<SubsetSnapshot> = scene
            .subsets
            .values()
            .filter(|s| s.model_id == model)
            .map(SubsetData::snapshot)
            .collect();
        live.sort_by(|a, b| a.custom_id.cmp(&b.custom_id));
        live
    }

    pub fn subset_snapshot(&self, model: ModelId, custom_id: &str) -> Option<SubsetSnapshot> {
        let scene = self.scene();
        let key = scene.by_custom_id.get(&(model, custom_id.to_string()))?;
        scene.subsets.get(*key).map(SubsetData::snapshot)
    }

    /// Number of `create_subset` calls that targeted an already live custom id.
    pub fn redundant_creates(&self) -> usize {
        self.scene().redundant_creates
    }

    pub fn is_disposed(&self) -> bool {
        self.scene().disposed
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    async fn load_model(&self, source: &ModelSource) -> Result<ModelId> {
        self.delay().await;
        let mut scene = self.scene();
        scene.ensure_live()?;
        let model = scene
            .catalog
            .get(source.label())
            .cloned()
            .ok_or_else(|| Error::Load(format!("unknown model source '{}'", source.label())))?;

        let id = ModelId(scene.next_model);
        scene.next_model += 1;
        tracing::debug!(model = %id, source = source.label(), elements = model.elements.len(), "Model loaded");
        scene.models.insert(id, LoadedModel { model, visible: true });
        Ok(id)
    }

    async fn spatial_structure(&self, model: ModelId) -> Result<RawSpatialNode> {
        self.delay().await;
        Ok(self.scene().model(model)?.model.spatial_structure())
    }

    async fn item_properties(&self, model: ModelId, element: ElementId) -> Result<PropertyBag> {
        self.delay().await;
        let scene = self.scene();
        let loaded = scene.model(model)?;
        if scene.failing_properties.contains(&element) {
            return Err(Error::Backend(format!(
                "property lookup failed for element {element}"
            )));
        }
        loaded
            .model
            .find(element)
            .map(MemoryElement::record)
            .ok_or(Error::ElementNotFound { model, element })
    }

    async fn all_element_ids(&self, model: ModelId) -> Result<Vec<ElementId>> {
        self.delay().await;
        let scene = self.scene();
        let loaded = scene.model(model)?;
        Ok(loaded.model.elements.iter().map(|e| e.id).collect())
    }

    async fn pick(&self) -> Result<Option<PickResult>> {
        self.delay().await;
        let mut scene = self.scene();
        scene.ensure_live()?;
        scene.picked = scene.pick_target;
        Ok(scene.picked)
    }

    async fn unpick(&self) -> Result<()> {
        self.delay().await;
        let mut scene = self.scene();
        scene.ensure_live()?;
        scene.picked = None;
        Ok(())
    }

    async fn highlight(
        &self,
        model: ModelId,
        elements: &[ElementId],
        additive: bool,
        clear_previous: bool,
    ) -> Result<()> {
        self.delay().await;
        let mut scene = self.scene();
        scene.model(model)?;
        if scene.fail_highlight {
            return Err(Error::Backend("highlight material unavailable".into()));
        }
        scene.highlights.push(HighlightCall {
            model_id: model,
            elements: elements.to_vec(),
            additive,
            clear_previous,
        });
        Ok(())
    }

    async fn create_subset(&self, request: SubsetRequest) -> Result<Option<SubsetHandle>> {
        self.delay().await;
        let mut guard = self.scene();
        let scene = &mut *guard;

        let loaded = scene.model(request.model_id)?;
        if let Some(bad) = request
            .element_ids
            .iter()
            .find(|id| scene.failing_subsets.contains(*id))
        {
            return Err(Error::Backend(format!(
                "geometry for element {bad} could not be extracted"
            )));
        }
        let ids: Vec<ElementId> = request
            .element_ids
            .iter()
            .copied()
            .filter(|id| loaded.model.find(*id).is_some())
            .collect();
        if ids.is_empty() {
            return Ok(None);
        }

        let index_key = (request.model_id, request.custom_id.clone());
        if let Some(&key) = scene.by_custom_id.get(&index_key) {
            scene.redundant_creates += 1;
            let data = &mut scene.subsets[key];
            if request.remove_previous {
                data.element_ids = ids;
            } else {
                for id in ids {
                    if !data.element_ids.contains(&id) {
                        data.element_ids.push(id);
                    }
                }
            }
            if request.material.is_some() {
                data.material = request.material;
            }
            return Ok(scene.handle(key));
        }

        let key = scene.subsets.insert(SubsetData {
            model_id: request.model_id,
            custom_id: request.custom_id.clone(),
            element_ids: ids,
            material: request.material,
            attached: false,
            visible: true,
            offset: Vector3::zeros(),
        });
        scene.by_custom_id.insert(index_key, key);
        Ok(Some(SubsetHandle {
            model_id: request.model_id,
            custom_id: request.custom_id,
            key,
        }))
    }

    fn subset(&self, model: ModelId, custom_id: &str) -> Option<SubsetHandle> {
        let scene = self.scene();
        if scene.disposed {
            return None;
        }
        let key = *scene.by_custom_id.get(&(model, custom_id.to_string()))?;
        scene.handle(key)
    }

    fn remove_subset(&self, model: ModelId, custom_id: &str) -> Result<bool> {
        let mut scene = self.scene();
        scene.ensure_live()?;
        match scene.by_custom_id.remove(&(model, custom_id.to_string())) {
            Some(key) => Ok(scene.subsets.remove(key).is_some()),
            None => Ok(false),
        }
    }

    fn attach_subset(&self, handle: &SubsetHandle) -> Result<()> {
        self.scene().subset_mut(handle)?.attached = true;
        Ok(())
    }

    fn set_subset_visible(&self, handle: &SubsetHandle, visible: bool) -> Result<()> {
        self.scene().subset_mut(handle)?.visible = visible;
        Ok(())
    }

    fn set_subset_offset(&self, handle: &SubsetHandle, offset: Vector3<f64>) -> Result<()> {
        self.scene().subset_mut(handle)?.offset = offset;
        Ok(())
    }

    fn subset_offset(&self, handle: &SubsetHandle) -> Result<Vector3<f64>> {
        Ok(self.scene().subset_mut(handle)?.offset)
    }

    fn set_model_visible(&self, model: ModelId, visible: bool) -> Result<()> {
        self.scene().model_mut(model)?.visible = visible;
        Ok(())
    }

    fn model_visible(&self, model: ModelId) -> Result<bool> {
        Ok(self.scene().model(model)?.visible)
    }

    fn model_bounds(&self, model: ModelId) -> Result<Option<Bounds>> {
        Ok(self.scene().model(model)?.model.bounds())
    }

    fn element_bounds(&self, model: ModelId, element: ElementId) -> Result<Option<Bounds>> {
        let scene = self.scene();
        let loaded = scene.model(model)?;
        loaded
            .model
            .find(element)
            .map(|e| e.bounds)
            .ok_or(Error::ElementNotFound { model, element })
    }

    async fn dispose(&self) {
        let mut scene = self.scene();
        scene.disposed = true;
        scene.models.clear();
        scene.subsets.clear();
        scene.by_custom_id.clear();
        scene.picked = None;
        tracing::debug!("Engine disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn engine() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine.register(
            "house.ifc",
            MemoryModel::new()
                .element(
                    MemoryElement::new(10, "IFCWALL")
                        .named("Wall A")
                        .bounds(Bounds::around(Point3::new(-5.0, 0.0, 0.0), 1.0)),
                )
                .element(
                    MemoryElement::new(11, "IFCSLAB")
                        .bounds(Bounds::around(Point3::new(5.0, 0.0, 0.0), 1.0)),
                )
                .element(MemoryElement::new(12, "IFCDOOR")),
        );
        engine
    }

    #[tokio::test]
    async fn unknown_sources_fail_to_load() {
        let engine = engine();
        let err = engine
            .load_model(&ModelSource::url("missing.ifc"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Load(_)));
    }

    #[tokio::test]
    async fn properties_follow_engine_record_shape() {
        let engine = engine();
        let model = engine.load_model(&ModelSource::url("house.ifc")).await.unwrap();

        let props = engine.item_properties(model, ElementId(10)).await.unwrap();
        assert_eq!(props.name(), Some("Wall A"));
        assert_eq!(props.id(), Some(ElementId(10)));
        assert!(!props.contains_key("id"));

        engine.fail_properties(11);
        assert!(engine.item_properties(model, ElementId(11)).await.is_err());
        assert!(matches!(
            engine.item_properties(model, ElementId(99)).await,
            Err(Error::ElementNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn subsets_are_unique_per_custom_id() {
        let engine = engine();
        let model = engine.load_model(&ModelSource::url("house.ifc")).await.unwrap();

        let first = engine
            .create_subset(SubsetRequest::new(model, "pair", [ElementId(10)]))
            .await
            .unwrap()
            .unwrap();
        let second = engine
            .create_subset(SubsetRequest::new(model, "pair", [ElementId(11)]))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.redundant_creates(), 1);
        let live = engine.live_subsets(model);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].element_ids, vec![ElementId(10), ElementId(11)]);
        assert!(!live[0].attached);
    }

    #[tokio::test]
    async fn removed_subsets_invalidate_handles() {
        let engine = engine();
        let model = engine.load_model(&ModelSource::url("house.ifc")).await.unwrap();
        let handle = engine
            .create_subset(SubsetRequest::new(model, "solo", [ElementId(12)]))
            .await
            .unwrap()
            .unwrap();
        engine.attach_subset(&handle).unwrap();

        assert!(engine.remove_subset(model, "solo").unwrap());
        assert!(!engine.remove_subset(model, "solo").unwrap());
        assert!(engine.subset(model, "solo").is_none());
        assert!(matches!(
            engine.set_subset_offset(&handle, Vector3::x()),
            Err(Error::SubsetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn empty_requests_produce_no_subset() {
        let engine = engine();
        let model = engine.load_model(&ModelSource::url("house.ifc")).await.unwrap();
        let none = engine
            .create_subset(SubsetRequest::new(model, "ghost", [ElementId(404)]))
            .await
            .unwrap();
        assert!(none.is_none());
        assert!(engine.live_subsets(model).is_empty());
    }

    #[tokio::test]
    async fn model_bounds_cover_elements_with_geometry() {
        let engine = engine();
        let model = engine.load_model(&ModelSource::url("house.ifc")).await.unwrap();
        let bounds = engine.model_bounds(model).unwrap().unwrap();
        assert_eq!(bounds.center(), Point3::new(0.0, 0.0, 0.0));
        assert_eq!(engine.element_bounds(model, ElementId(12)).unwrap(), None);
    }

    #[tokio::test]
    async fn dispose_releases_the_scene() {
        let engine = engine();
        let model = engine.load_model(&ModelSource::url("house.ifc")).await.unwrap();
        engine.dispose().await;
        assert!(engine.is_disposed());
        assert!(matches!(engine.model_visible(model), Err(Error::Disposed)));
        assert!(matches!(engine.pick().await, Err(Error::Disposed)));
    }
}
