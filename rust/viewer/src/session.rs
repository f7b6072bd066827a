// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One mounted viewer.
//!
//! [`ViewerSession`] wires the engine, the collaboration channel and the
//! per-model components together and maps host UI actions onto them.

use ifc_share_engine::{ElementId, Engine, ModelId, ModelSource, RawSpatialNode};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::collab::{Channel, CollaborationSync, SelectionEvent};
use crate::config::ViewerConfig;
use crate::error::{Result, ViewerError};
use crate::explode::{ExplodeAnimator, ExplodePhase};
use crate::inspection::{ElementRef, InspectionController};
use crate::lifecycle::Liveness;
use crate::subsets::{IsolateOutcome, SubsetRegistry};
use crate::tree::{SpatialNode, SpatialTreeBuilder};

/// A model that finished loading, with its tree and per-model components.
pub struct LoadedModel {
    pub id: ModelId,
    pub tree: SpatialNode,
    pub registry: Arc<SubsetRegistry>,
    pub animator: ExplodeAnimator,
}

pub struct ViewerSession {
    engine: Arc<dyn Engine>,
    config: ViewerConfig,
    liveness: Liveness,
    sync: CollaborationSync,
    inspection: InspectionController,
    model: RwLock<Option<Arc<LoadedModel>>>,
}

impl ViewerSession {
    /// Mounts a viewer and joins the configured room. A failed join is
    /// logged; the viewer works without collaboration.
    pub async fn mount(
        engine: Arc<dyn Engine>,
        channel: Arc<dyn Channel>,
        config: ViewerConfig,
    ) -> Self {
        let liveness = Liveness::new();
        let sync = CollaborationSync::new(
            channel,
            Arc::clone(&engine),
            config.room.clone(),
            liveness.clone(),
        );
        if let Err(e) = sync.mount().await {
            warn!(room = %config.room, error = %e, "Could not join collaboration room");
        }
        let inspection = InspectionController::new(Arc::clone(&engine), liveness.clone());

        Self {
            engine,
            config,
            liveness,
            sync,
            inspection,
            model: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn is_mounted(&self) -> bool {
        self.liveness.is_alive()
    }

    pub fn inspection(&self) -> &InspectionController {
        &self.inspection
    }

    pub fn collaboration(&self) -> &CollaborationSync {
        &self.sync
    }

    /// The currently loaded model.
    pub fn model(&self) -> Option<Arc<LoadedModel>> {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require_model(&self) -> Result<Arc<LoadedModel>> {
        self.liveness.ensure()?;
        self.model().ok_or(ViewerError::NoModel)
    }

    fn replace_model(&self, model: Option<Arc<LoadedModel>>) -> Option<Arc<LoadedModel>> {
        let mut slot = self.model.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, model)
    }

    /// Loads a model and builds its spatial tree.
    ///
    /// A load failure is returned. A missing spatial structure is not: the
    /// tree then consists of a bare project node.
    pub async fn open_model(&self, source: &ModelSource) -> Result<Arc<LoadedModel>> {
        self.liveness.ensure()?;
        self.inspection.reset();
        if let Some(previous) = self.replace_model(None) {
            previous.animator.cancel();
        }

        let id = self.engine.load_model(source).await?;
        self.liveness.ensure()?;

        let raw = match self.engine.spatial_structure(id).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(model = %id, error = %e, "Spatial structure unavailable");
                RawSpatialNode::new("IFCPROJECT")
            }
        };
        let tree = SpatialTreeBuilder::from_config(self.engine.as_ref(), id, &self.config)
            .build(&raw)
            .await;
        self.liveness.ensure()?;

        let registry = Arc::new(SubsetRegistry::new(
            Arc::clone(&self.engine),
            id,
            self.liveness.clone(),
        ));
        let animator = ExplodeAnimator::new(
            Arc::clone(&self.engine),
            Arc::clone(&registry),
            self.config.clone(),
            self.liveness.clone(),
        );
        let loaded = Arc::new(LoadedModel {
            id,
            tree,
            registry,
            animator,
        });
        self.replace_model(Some(Arc::clone(&loaded)));

        info!(
            model = %id,
            source = source.label(),
            nodes = loaded.tree.node_count(),
            "Model opened"
        );
        Ok(loaded)
    }

    /// Tree-node click: toggles the show-only view of `element`.
    pub async fn select_tree_node(&self, element: ElementId) -> Result<IsolateOutcome> {
        self.require_model()?.registry.isolate(element).await
    }

    pub async fn clear_isolation(&self) -> Result<usize> {
        self.require_model()?.registry.clear_isolation().await
    }

    /// Explode button.
    pub async fn toggle_explode(&self) -> Result<ExplodePhase> {
        self.require_model()?.animator.toggle().await
    }

    pub fn is_exploded(&self) -> bool {
        self.model().is_some_and(|m| m.animator.is_exploded())
    }

    /// Waits for running explode/reset animations to finish.
    pub async fn settle(&self) {
        if let Some(model) = self.model() {
            model.animator.settle().await;
        }
    }

    /// Canvas click: picks, selects and shares the selection with the room.
    /// Hits on elements hidden by isolation or explode are ignored.
    pub async fn click(&self) -> Result<Option<ElementRef>> {
        self.liveness.ensure()?;
        let Some(model) = self.model() else {
            return Ok(None);
        };
        let hit = self
            .inspection
            .pick_visible(|hit| hit.model_id != model.id || model.registry.is_visible(hit.element_id))
            .await?;
        if let Some(hit) = hit {
            if self.config.broadcast_selection {
                self.sync.publish(SelectionEvent::from(hit)).await;
            }
        }
        Ok(hit)
    }

    pub async fn clear_selection(&self) {
        self.inspection.clear_selection().await;
    }

    /// Comment submit.
    pub fn save_comment(&self, text: &str) -> bool {
        self.inspection.save_comment(text)
    }

    /// Restores the pristine view: no isolation, no pick, no explode, default
    /// mesh shown, nothing selected.
    pub async fn full_reset(&self) -> Result<()> {
        let model = self.require_model()?;
        model.registry.clear_isolation().await?;
        if let Err(e) = self.engine.unpick().await {
            debug!(error = %e, "Unpick failed");
        }
        let removed = model.animator.collapse_now().await?;
        self.inspection.reset();
        info!(model = %model.id, removed, "View reset");
        Ok(())
    }

    /// Tears the viewer down. In-flight operations observe the unmount and
    /// stop before touching state.
    pub async fn unmount(&self) {
        if !self.liveness.shutdown() {
            return;
        }
        self.sync.unmount();
        if let Some(model) = self.replace_model(None) {
            model.animator.cancel();
        }
        self.engine.dispose().await;
        info!("Viewer unmounted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::RoomHub;
    use ifc_share_engine::{MemoryElement, MemoryEngine, MemoryModel, PickResult};

    async fn session() -> (Arc<MemoryEngine>, RoomHub, ViewerSession) {
        let engine = Arc::new(MemoryEngine::new());
        engine.register(
            "office.ifc",
            MemoryModel::new()
                .element(MemoryElement::new(10, "IFCWALL").named("North wall"))
                .element(MemoryElement::new(11, "IFCWALL"))
                .element(MemoryElement::new(12, "IFCWINDOW")),
        );
        let hub = RoomHub::new();
        let session = ViewerSession::mount(
            engine.clone(),
            Arc::new(hub.connect()),
            ViewerConfig::default(),
        )
        .await;
        (engine, hub, session)
    }

    #[tokio::test]
    async fn actions_need_a_model() {
        let (_engine, _hub, session) = session().await;
        assert!(matches!(
            session.select_tree_node(ElementId(10)).await,
            Err(ViewerError::NoModel)
        ));
        assert!(session.click().await.unwrap().is_none());
        assert!(!session.is_exploded());
    }

    #[tokio::test]
    async fn open_model_builds_tree() {
        let (_engine, hub, session) = session().await;
        let model = session.open_model(&ModelSource::url("office.ifc")).await.unwrap();
        assert_eq!(model.tree.node_count(), 4);
        assert_eq!(model.tree.children[0].name, "North wall");
        assert_eq!(hub.members(&Default::default()), 1);
    }

    #[tokio::test]
    async fn unknown_sources_fail() {
        let (_engine, _hub, session) = session().await;
        let err = session.open_model(&ModelSource::url("nope.ifc")).await;
        assert!(matches!(err, Err(ViewerError::Engine(_))));
        assert!(session.model().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn full_reset_restores_pristine_view() {
        let (engine, _hub, session) = session().await;
        let model = session.open_model(&ModelSource::url("office.ifc")).await.unwrap();
        engine.set_pick_target(Some(PickResult {
            model_id: model.id,
            element_id: ElementId(11),
        }));

        session.select_tree_node(ElementId(10)).await.unwrap();
        session.toggle_explode().await.unwrap();
        session.click().await.unwrap();
        session.inspection().set_draft("draft");

        session.full_reset().await.unwrap();
        session.settle().await;

        assert!(engine.live_subsets(model.id).is_empty());
        assert!(engine.model_visible(model.id).unwrap());
        assert!(engine.picked().is_none());
        assert!(!session.is_exploded());
        assert!(session.inspection().selected().is_none());
        assert!(!session.inspection().is_panel_open());
        assert_eq!(session.inspection().draft(), "");
    }

    #[tokio::test]
    async fn clicks_on_hidden_elements_are_ignored() {
        let (engine, _hub, session) = session().await;
        let model = session.open_model(&ModelSource::url("office.ifc")).await.unwrap();
        session.select_tree_node(ElementId(11)).await.unwrap();

        engine.set_pick_target(Some(PickResult {
            model_id: model.id,
            element_id: ElementId(10),
        }));
        assert!(session.click().await.unwrap().is_none());
        assert!(session.inspection().selected().is_none());

        engine.set_pick_target(Some(PickResult {
            model_id: model.id,
            element_id: ElementId(11),
        }));
        assert!(session.click().await.unwrap().is_some());
        assert_eq!(
            session.inspection().selected().map(|s| s.element_id),
            Some(ElementId(11))
        );
    }

    #[tokio::test]
    async fn unmount_disposes_engine_once() {
        let (engine, _hub, session) = session().await;
        session.open_model(&ModelSource::url("office.ifc")).await.unwrap();

        session.unmount().await;
        session.unmount().await;

        assert!(engine.is_disposed());
        assert!(!session.is_mounted());
        assert!(matches!(
            session.toggle_explode().await,
            Err(ViewerError::Unmounted)
        ));
        assert!(!session.collaboration().is_mounted());
    }
}
