// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raw spatial containment structure (project → site → building → storey →
//! element) as reported by the engine.

use serde::{Deserialize, Serialize};

use crate::types::ElementId;

/// One node of the engine's spatial structure.
///
/// Serialized in the engine's own shape:
/// `{"type": "IFCBUILDINGSTOREY", "expressID": 38, "children": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSpatialNode {
    #[serde(rename = "type", alias = "typeName", default)]
    pub type_name: String,
    #[serde(
        rename = "expressID",
        alias = "elementId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub element_id: Option<ElementId>,
    #[serde(default)]
    pub children: Vec<RawSpatialNode>,
}

impl RawSpatialNode {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            element_id: None,
            children: Vec::new(),
        }
    }

    pub fn element(type_name: impl Into<String>, id: impl Into<ElementId>) -> Self {
        Self {
            type_name: type_name.into(),
            element_id: Some(id.into()),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: RawSpatialNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = RawSpatialNode>) -> Self {
        self.children.extend(children);
        self
    }

    /// Total number of nodes, including `self`.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }
}

// Deep hierarchies must not blow the stack when dropped.
impl Drop for RawSpatialNode {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}
