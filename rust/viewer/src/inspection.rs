// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Picking, selection and comments.
//!
//! Selection is independent of isolation and explode: picking never touches
//! subsets or default visibility.

use ifc_share_engine::{ElementId, Engine, ModelId, PickResult, PropertyBag};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::comments::{Comment, CommentBook};
use crate::error::Result;
use crate::lifecycle::Liveness;

/// Reference to a picked element.
pub type ElementRef = PickResult;

/// The element currently shown in the inspection view.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedElement {
    pub model_id: ModelId,
    pub element_id: ElementId,
    pub properties: PropertyBag,
}

impl SelectedElement {
    pub fn element_ref(&self) -> ElementRef {
        ElementRef {
            model_id: self.model_id,
            element_id: self.element_id,
        }
    }

    /// `Name.value` of the property bag, if present.
    pub fn name(&self) -> Option<&str> {
        self.properties.name()
    }

    /// The property bag as indented JSON.
    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.properties)?)
    }
}

#[derive(Debug, Default)]
struct InspectionState {
    selected: Option<SelectedElement>,
    draft: String,
    panel_open: bool,
    comments: CommentBook,
}

pub struct InspectionController {
    engine: Arc<dyn Engine>,
    liveness: Liveness,
    state: Mutex<InspectionState>,
}

impl InspectionController {
    pub fn new(engine: Arc<dyn Engine>, liveness: Liveness) -> Self {
        Self {
            engine,
            liveness,
            state: Mutex::new(InspectionState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, InspectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ray-picks and selects whatever was hit.
    ///
    /// A miss leaves the current selection alone. Pick failures are logged
    /// and reported as a miss.
    pub async fn pick(&self) -> Result<Option<ElementRef>> {
        self.pick_visible(|_| true).await
    }

    /// Like [`pick`](Self::pick), but a hit for which `is_visible` returns
    /// `false` counts as a miss.
    pub async fn pick_visible<F>(&self, is_visible: F) -> Result<Option<ElementRef>>
    where
        F: Fn(&ElementRef) -> bool + Send + Sync,
    {
        self.liveness.ensure()?;
        let hit = match self.engine.pick().await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, "Pick failed");
                return Ok(None);
            }
        };
        self.liveness.ensure()?;

        let Some(hit) = hit else {
            return Ok(None);
        };
        if !is_visible(&hit) {
            debug!(element = %hit.element_id, "Ignored pick on hidden element");
            return Ok(None);
        }
        self.select(hit).await?;
        Ok(Some(hit))
    }

    /// Selects an element, fetching its properties best-effort.
    pub async fn select(&self, element: ElementRef) -> Result<()> {
        let mut properties = match self
            .engine
            .item_properties(element.model_id, element.element_id)
            .await
        {
            Ok(properties) => properties,
            Err(e) => {
                warn!(element = %element.element_id, error = %e, "Property fetch failed");
                PropertyBag::new()
            }
        };
        self.liveness.ensure()?;

        if properties.ensure_id(element.element_id) {
            debug!(element = %element.element_id, "Patched missing id into property bag");
        }

        let mut state = self.state();
        state.selected = Some(SelectedElement {
            model_id: element.model_id,
            element_id: element.element_id,
            properties,
        });
        state.draft.clear();
        state.panel_open = true;
        Ok(())
    }

    /// Un-picks in the engine and closes the inspection view.
    pub async fn clear_selection(&self) {
        if let Err(e) = self.engine.unpick().await {
            debug!(error = %e, "Unpick failed");
        }
        let mut state = self.state();
        state.selected = None;
        state.panel_open = false;
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        self.state().draft = text.into();
    }

    pub fn draft(&self) -> String {
        self.state().draft.clone()
    }

    /// Attaches `text` to the selected element. Ignored when nothing is
    /// selected, when the text is blank, or when it duplicates an existing
    /// comment on the same element.
    pub fn save_comment(&self, text: &str) -> bool {
        let mut state = self.state();
        let state = &mut *state;
        let Some(selected) = &state.selected else {
            return false;
        };
        let added = state
            .comments
            .add(selected.element_id, selected.name(), text);
        if added {
            info!(element = %selected.element_id, "Comment added");
        }
        added
    }

    /// Saves the current draft. The draft is kept.
    pub fn save_draft(&self) -> bool {
        let draft = self.draft();
        self.save_comment(&draft)
    }

    /// Jumps to the element a comment belongs to: un-picks, highlights it and
    /// selects it with freshly fetched properties.
    pub async fn focus_comment(&self, model: ModelId, comment: &Comment) -> Result<()> {
        self.liveness.ensure()?;
        if let Err(e) = self.engine.unpick().await {
            debug!(error = %e, "Unpick failed");
        }
        if let Err(e) = self
            .engine
            .highlight(model, &[comment.element_id], true, true)
            .await
        {
            warn!(element = %comment.element_id, error = %e, "Highlight failed");
        }
        self.select(ElementRef {
            model_id: model,
            element_id: comment.element_id,
        })
        .await
    }

    pub fn selected(&self) -> Option<SelectedElement> {
        self.state().selected.clone()
    }

    /// Pretty JSON of the selected element's properties.
    pub fn selected_json(&self) -> Result<Option<String>> {
        self.state()
            .selected
            .as_ref()
            .map(SelectedElement::to_pretty_json)
            .transpose()
    }

    pub fn is_panel_open(&self) -> bool {
        self.state().panel_open
    }

    /// Comments of the selected element.
    pub fn selected_comments(&self) -> Vec<Comment> {
        let state = self.state();
        match &state.selected {
            Some(selected) => state.comments.for_element(selected.element_id).to_vec(),
            None => Vec::new(),
        }
    }

    pub fn comments_for(&self, element: ElementId) -> Vec<Comment> {
        self.state().comments.for_element(element).to_vec()
    }

    pub fn all_comments(&self) -> Vec<Comment> {
        self.state().comments.iter().cloned().collect()
    }

    /// Clears the selection, the draft and the view. Comments survive.
    pub fn reset(&self) {
        let mut state = self.state();
        state.selected = None;
        state.draft.clear();
        state.panel_open = false;
    }
}
