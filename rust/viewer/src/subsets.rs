// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subset registry.
//!
//! The registry is the only component that creates or removes subsets. It
//! keeps two families of them, both named by element id:
//!
//! - `show-only-<id>`: a tree-node isolation of a single element
//! - `explode-<id>`: one element of an exploded model
//!
//! Every operation on a given custom id runs under that id's async lock, so a
//! second call for the same id observes the first call's result instead of
//! racing it.
//!
//! Default mesh visibility is derived rather than toggled: the model's own
//! mesh is shown exactly when nothing is isolated or being isolated and the
//! model is not exploded.

use indexmap::IndexMap;
use ifc_share_engine::{ElementId, Engine, ModelId, SubsetHandle, SubsetRequest};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::lifecycle::Liveness;

pub const ISOLATE_PREFIX: &str = "show-only-";
pub const EXPLODE_PREFIX: &str = "explode-";

/// Custom id of the show-only subset for `element`.
pub fn isolation_id(element: ElementId) -> String {
    format!("{ISOLATE_PREFIX}{element}")
}

/// Custom id of the exploded subset for `element`.
pub fn explode_id(element: ElementId) -> String {
    format!("{EXPLODE_PREFIX}{element}")
}

/// What an [`SubsetRegistry::isolate`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolateOutcome {
    /// The element is now shown on its own.
    Shown,
    /// The element was isolated and the toggle removed its subset.
    Hidden,
    /// The engine could not produce a subset; nothing changed.
    Unavailable,
}

/// One element of an exploded model.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplodedSubset {
    pub element: ElementId,
    pub handle: SubsetHandle,
    /// Position of the element in the model's element list.
    pub index: usize,
}

#[derive(Debug, Default)]
struct VisibilityState {
    isolated: BTreeMap<ElementId, SubsetHandle>,
    /// Isolations waiting on subset creation.
    pending: BTreeSet<ElementId>,
    exploded: IndexMap<ElementId, ExplodedSubset>,
    explode_active: bool,
}

impl VisibilityState {
    fn default_visible(&self) -> bool {
        self.isolated.is_empty() && self.pending.is_empty() && !self.explode_active
    }
}

/// Marks an isolation in flight until dropped.
struct PendingIsolation<'a> {
    registry: &'a SubsetRegistry,
    element: ElementId,
}

impl<'a> PendingIsolation<'a> {
    fn begin(registry: &'a SubsetRegistry, element: ElementId) -> Self {
        registry.state().pending.insert(element);
        Self { registry, element }
    }
}

impl Drop for PendingIsolation<'_> {
    fn drop(&mut self) {
        self.registry.state().pending.remove(&self.element);
    }
}

/// One async lock per custom id.
#[derive(Debug, Default)]
struct KeyedLocks {
    locks: Mutex<FxHashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop locks nobody holds or waits on.
            if locks.len() > 1024 {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

/// Owner of every show-only and explode subset of one model.
pub struct SubsetRegistry {
    engine: Arc<dyn Engine>,
    model: ModelId,
    liveness: Liveness,
    locks: KeyedLocks,
    state: Mutex<VisibilityState>,
}

impl SubsetRegistry {
    pub fn new(engine: Arc<dyn Engine>, model: ModelId, liveness: Liveness) -> Self {
        Self {
            engine,
            model,
            liveness,
            locks: KeyedLocks::default(),
            state: Mutex::new(VisibilityState::default()),
        }
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    fn state(&self) -> MutexGuard<'_, VisibilityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pushes the derived default visibility to the engine.
    fn sync_default_visibility(&self) -> Result<bool> {
        let visible = self.state().default_visible();
        self.engine.set_model_visible(self.model, visible)?;
        Ok(visible)
    }

    // --- Isolation ---

    /// Toggles the show-only subset of `element`.
    ///
    /// Engine failures while creating the subset are logged and reported as
    /// [`IsolateOutcome::Unavailable`].
    pub async fn isolate(&self, element: ElementId) -> Result<IsolateOutcome> {
        self.liveness.ensure()?;
        let custom_id = isolation_id(element);
        let _guard = self.locks.acquire(&custom_id).await;
        self.liveness.ensure()?;

        if self.engine.subset(self.model, &custom_id).is_some() {
            self.engine.remove_subset(self.model, &custom_id)?;
            self.state().isolated.remove(&element);
            let visible = self.sync_default_visibility()?;
            info!(element = %element, default_visible = visible, "Isolation removed");
            return Ok(IsolateOutcome::Hidden);
        }

        let pending = PendingIsolation::begin(self, element);
        self.sync_default_visibility()?;
        let request =
            SubsetRequest::new(self.model, custom_id.as_str(), [element]).remove_previous(true);
        let created = self.engine.create_subset(request).await;
        self.liveness.ensure()?;

        let handle = match created {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                warn!(element = %element, "Element has no geometry to isolate");
                drop(pending);
                self.sync_default_visibility()?;
                return Ok(IsolateOutcome::Unavailable);
            }
            Err(e) => {
                warn!(element = %element, error = %e, "Subset creation failed");
                drop(pending);
                self.sync_default_visibility()?;
                return Ok(IsolateOutcome::Unavailable);
            }
        };

        self.engine.attach_subset(&handle)?;
        self.engine.set_subset_visible(&handle, true)?;
        self.state().isolated.insert(element, handle);
        drop(pending);
        self.sync_default_visibility()?;
        info!(element = %element, custom_id = %custom_id, "Element isolated");
        Ok(IsolateOutcome::Shown)
    }

    /// Removes every show-only subset. Returns how many were removed.
    pub async fn clear_isolation(&self) -> Result<usize> {
        self.liveness.ensure()?;
        let isolated: Vec<ElementId> = self.state().isolated.keys().copied().collect();
        if isolated.is_empty() {
            return Ok(0);
        }

        let mut removed = 0;
        for element in isolated {
            let custom_id = isolation_id(element);
            let _guard = self.locks.acquire(&custom_id).await;
            self.liveness.ensure()?;
            if self.engine.remove_subset(self.model, &custom_id)? {
                removed += 1;
            }
            self.state().isolated.remove(&element);
        }
        self.sync_default_visibility()?;
        debug!(removed, "Isolation cleared");
        Ok(removed)
    }

    pub fn isolated_ids(&self) -> Vec<ElementId> {
        self.state().isolated.keys().copied().collect()
    }

    pub fn is_isolated(&self, element: ElementId) -> bool {
        self.state().isolated.contains_key(&element)
    }

    // --- Explode ---

    /// Hides the default mesh and makes sure every element of the model has
    /// an attached, visible `explode-<id>` subset. Existing subsets are
    /// reused. Elements whose subset cannot be created are logged and
    /// skipped.
    pub async fn explode_all(&self) -> Result<Vec<ExplodedSubset>> {
        self.liveness.ensure()?;
        let ids = self.engine.all_element_ids(self.model).await?;
        self.liveness.ensure()?;

        let mut seen = FxHashSet::default();
        let ids: Vec<ElementId> = ids.into_iter().filter(|id| seen.insert(*id)).collect();

        self.state().explode_active = true;
        self.engine.set_model_visible(self.model, false)?;

        let mut exploded = Vec::with_capacity(ids.len());
        for (index, element) in ids.into_iter().enumerate() {
            let custom_id = explode_id(element);
            let _guard = self.locks.acquire(&custom_id).await;
            self.liveness.ensure()?;

            let handle = match self.engine.subset(self.model, &custom_id) {
                Some(handle) => handle,
                None => {
                    let request = SubsetRequest::new(self.model, custom_id.as_str(), [element])
                        .remove_previous(true);
                    let created = self.engine.create_subset(request).await;
                    self.liveness.ensure()?;
                    match created {
                        Ok(Some(handle)) => handle,
                        Ok(None) => {
                            debug!(element = %element, "No geometry to explode");
                            continue;
                        }
                        Err(e) => {
                            warn!(element = %element, error = %e, "Failed to explode element");
                            continue;
                        }
                    }
                }
            };

            let shown = self
                .engine
                .attach_subset(&handle)
                .and_then(|_| self.engine.set_subset_visible(&handle, true));
            if let Err(e) = shown {
                warn!(element = %element, error = %e, "Failed to show exploded element");
                continue;
            }

            let entry = ExplodedSubset {
                element,
                handle,
                index,
            };
            self.state().exploded.insert(element, entry.clone());
            exploded.push(entry);
        }

        info!(model = %self.model, subsets = exploded.len(), "Model exploded");
        Ok(exploded)
    }

    /// Leaves the exploded state and restores default visibility. The
    /// exploded subsets stay live; the caller animates them back home.
    pub fn reset_all(&self) -> Result<Vec<ExplodedSubset>> {
        self.liveness.ensure()?;
        let exploded: Vec<ExplodedSubset> = {
            let mut state = self.state();
            state.explode_active = false;
            state.exploded.values().cloned().collect()
        };
        self.sync_default_visibility()?;
        Ok(exploded)
    }

    /// Removes every exploded subset. Returns how many were removed.
    pub async fn remove_exploded(&self) -> Result<usize> {
        self.liveness.ensure()?;
        let elements: Vec<ElementId> = self.state().exploded.keys().copied().collect();

        let mut removed = 0;
        for element in elements {
            let custom_id = explode_id(element);
            let _guard = self.locks.acquire(&custom_id).await;
            self.liveness.ensure()?;
            if self.engine.remove_subset(self.model, &custom_id)? {
                removed += 1;
            }
            self.state().exploded.shift_remove(&element);
        }
        self.state().explode_active = false;
        self.sync_default_visibility()?;
        Ok(removed)
    }

    pub fn exploded(&self) -> Vec<ExplodedSubset> {
        self.state().exploded.values().cloned().collect()
    }

    pub fn is_explode_active(&self) -> bool {
        self.state().explode_active
    }

    /// Whether `element` is drawn right now, by the default mesh or by one of
    /// the registry's subsets.
    pub fn is_visible(&self, element: ElementId) -> bool {
        let state = self.state();
        state.default_visible()
            || state.isolated.contains_key(&element)
            || (state.explode_active && state.exploded.contains_key(&element))
    }

    /// Whether the model's own mesh should be shown right now.
    pub fn default_visible(&self) -> bool {
        self.state().default_visible()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifc_share_engine::{MemoryElement, MemoryEngine, MemoryModel, ModelSource};
    use std::time::Duration;

    async fn registry(ids: &[u32]) -> (Arc<MemoryEngine>, SubsetRegistry) {
        let engine = Arc::new(MemoryEngine::new());
        let mut model = MemoryModel::new();
        for id in ids {
            model = model.element(MemoryElement::new(*id, "IFCWALL"));
        }
        engine.register("walls.ifc", model);
        let model = engine.load_model(&ModelSource::url("walls.ifc")).await.unwrap();
        let registry = SubsetRegistry::new(engine.clone(), model, Liveness::new());
        (engine, registry)
    }

    #[tokio::test]
    async fn isolate_toggles_back_to_default() {
        let (engine, registry) = registry(&[10, 11, 12]).await;
        let model = registry.model();

        assert_eq!(registry.isolate(ElementId(11)).await.unwrap(), IsolateOutcome::Shown);
        assert!(!engine.model_visible(model).unwrap());
        let live = engine.live_subsets(model);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].custom_id, "show-only-11");
        assert_eq!(live[0].element_ids, vec![ElementId(11)]);
        assert!(live[0].attached && live[0].visible);

        assert_eq!(registry.isolate(ElementId(11)).await.unwrap(), IsolateOutcome::Hidden);
        assert!(engine.model_visible(model).unwrap());
        assert!(engine.live_subsets(model).is_empty());
        assert!(registry.isolated_ids().is_empty());
    }

    #[tokio::test]
    async fn default_stays_hidden_while_anything_is_isolated() {
        let (engine, registry) = registry(&[10, 11]).await;
        registry.isolate(ElementId(10)).await.unwrap();
        registry.isolate(ElementId(11)).await.unwrap();
        registry.isolate(ElementId(10)).await.unwrap();

        assert!(!engine.model_visible(registry.model()).unwrap());
        assert_eq!(registry.isolated_ids(), vec![ElementId(11)]);

        assert_eq!(registry.clear_isolation().await.unwrap(), 1);
        assert!(engine.model_visible(registry.model()).unwrap());
        assert_eq!(registry.clear_isolation().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_isolates_never_duplicate() {
        let (engine, registry) = registry(&[10, 11, 12]).await;
        engine.set_latency(Duration::from_millis(50));

        let (a, b) = tokio::join!(registry.isolate(ElementId(12)), registry.isolate(ElementId(12)));
        assert_eq!(a.unwrap(), IsolateOutcome::Shown);
        assert_eq!(b.unwrap(), IsolateOutcome::Hidden);
        assert_eq!(engine.redundant_creates(), 0);
        assert!(engine.live_subsets(registry.model()).is_empty());
    }

    #[tokio::test]
    async fn visibility_follows_isolation_and_explode() {
        let (_engine, registry) = registry(&[10, 11]).await;
        assert!(registry.is_visible(ElementId(10)));

        registry.isolate(ElementId(11)).await.unwrap();
        assert!(!registry.is_visible(ElementId(10)));
        assert!(registry.is_visible(ElementId(11)));

        registry.clear_isolation().await.unwrap();
        registry.explode_all().await.unwrap();
        assert!(registry.is_visible(ElementId(10)));
        assert!(!registry.is_visible(ElementId(99)));
    }

    #[tokio::test]
    async fn failed_isolation_leaves_view_untouched() {
        let (engine, registry) = registry(&[10]).await;
        engine.fail_subset(10);

        assert_eq!(
            registry.isolate(ElementId(10)).await.unwrap(),
            IsolateOutcome::Unavailable
        );
        assert!(engine.model_visible(registry.model()).unwrap());
        assert!(!registry.is_isolated(ElementId(10)));
    }

    #[tokio::test]
    async fn explode_skips_failures_and_reuses_subsets() {
        let (engine, registry) = registry(&[1, 2, 3, 4]).await;
        engine.fail_subset(3);

        let exploded = registry.explode_all().await.unwrap();
        let ids: Vec<ElementId> = exploded.iter().map(|e| e.element).collect();
        assert_eq!(ids, vec![ElementId(1), ElementId(2), ElementId(4)]);
        assert_eq!(exploded[2].index, 3);
        assert!(!engine.model_visible(registry.model()).unwrap());

        let reset = registry.reset_all().unwrap();
        assert_eq!(reset.len(), 3);
        assert!(engine.model_visible(registry.model()).unwrap());
        assert_eq!(engine.live_subsets(registry.model()).len(), 3);

        registry.explode_all().await.unwrap();
        assert_eq!(engine.redundant_creates(), 0);

        assert_eq!(registry.remove_exploded().await.unwrap(), 3);
        assert!(engine.live_subsets(registry.model()).is_empty());
        assert!(registry.default_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_off_during_another_isolation_keeps_default_hidden() {
        let (engine, registry) = registry(&[10, 11]).await;
        registry.isolate(ElementId(10)).await.unwrap();
        engine.set_latency(Duration::from_millis(50));

        let (shown, hidden) =
            tokio::join!(registry.isolate(ElementId(11)), registry.isolate(ElementId(10)));
        assert_eq!(shown.unwrap(), IsolateOutcome::Shown);
        assert_eq!(hidden.unwrap(), IsolateOutcome::Hidden);

        let live = engine.live_subsets(registry.model());
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].custom_id, "show-only-11");
        assert!(live[0].visible);
        assert!(!engine.model_visible(registry.model()).unwrap());
        assert!(!registry.default_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_during_an_isolation_keeps_default_hidden() {
        let (engine, registry) = registry(&[10, 11]).await;
        registry.isolate(ElementId(10)).await.unwrap();
        engine.set_latency(Duration::from_millis(50));

        let (shown, cleared) =
            tokio::join!(registry.isolate(ElementId(11)), registry.clear_isolation());
        assert_eq!(shown.unwrap(), IsolateOutcome::Shown);
        assert_eq!(cleared.unwrap(), 1);

        assert_eq!(registry.isolated_ids(), vec![ElementId(11)]);
        assert!(!engine.model_visible(registry.model()).unwrap());
        assert!(!registry.default_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_during_an_isolation_keeps_default_hidden() {
        let (engine, registry) = registry(&[10, 11]).await;
        registry.explode_all().await.unwrap();
        engine.set_latency(Duration::from_millis(50));

        let (shown, reset) = tokio::join!(registry.isolate(ElementId(11)), async {
            registry.reset_all()
        });
        assert_eq!(shown.unwrap(), IsolateOutcome::Shown);
        assert_eq!(reset.unwrap().len(), 2);

        assert!(!engine.model_visible(registry.model()).unwrap());
        assert!(!registry.default_visible());
    }

    #[tokio::test]
    async fn unmounted_registry_refuses_work() {
        let (_engine, registry) = registry(&[1]).await;
        registry.liveness.shutdown();
        assert!(registry.isolate(ElementId(1)).await.is_err());
        assert!(registry.explode_all().await.is_err());
    }
}
