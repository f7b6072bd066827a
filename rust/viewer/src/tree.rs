// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Display tree of a model's spatial structure.
//!
//! [`SpatialTreeBuilder`] walks the engine's [`RawSpatialNode`] hierarchy and
//! resolves a display name for every node that carries an element id. Name
//! lookups run concurrently with a bounded fan-out and a per-lookup timeout;
//! a failed, slow or nameless lookup falls back to the structural type name.
//!
//! Construction, traversal and drop are all iterative, so hierarchies of any
//! depth are safe.

use futures_util::stream::{self, StreamExt};
use ifc_share_engine::{ElementId, Engine, ModelId, RawSpatialNode};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::config::{ViewerConfig, NAME_LOOKUP_CONCURRENCY, NAME_LOOKUP_TIMEOUT};

/// Name used when a node has neither a resolvable name nor a type name.
pub const UNNAMED: &str = "Unnamed";

/// A node of the resolved spatial tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpatialNode {
    pub name: String,
    #[serde(rename = "expressID", skip_serializing_if = "Option::is_none")]
    pub element_id: Option<ElementId>,
    pub children: Vec<SpatialNode>,
}

impl SpatialNode {
    pub fn new(name: impl Into<String>, element_id: Option<ElementId>) -> Self {
        Self {
            name: name.into(),
            element_id,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        self.iter().count()
    }

    /// Pre-order traversal.
    pub fn iter(&self) -> Iter<'_> {
        Iter { stack: vec![self] }
    }

    /// First node (in pre-order) bound to `element`.
    pub fn find(&self, element: ElementId) -> Option<&SpatialNode> {
        self.iter().find(|node| node.element_id == Some(element))
    }

    /// Element ids in pre-order.
    pub fn element_ids(&self) -> Vec<ElementId> {
        self.iter().filter_map(|node| node.element_id).collect()
    }
}

impl Drop for SpatialNode {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut node) = stack.pop() {
            stack.append(&mut node.children);
        }
    }
}

impl<'a> IntoIterator for &'a SpatialNode {
    type Item = &'a SpatialNode;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Pre-order iterator over a [`SpatialNode`] subtree.
pub struct Iter<'a> {
    stack: Vec<&'a SpatialNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a SpatialNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Raw node flattened in pre-order, with the index of its parent.
struct FlatNode<'a> {
    raw: &'a RawSpatialNode,
    parent: Option<usize>,
}

fn flatten(root: &RawSpatialNode) -> Vec<FlatNode<'_>> {
    let mut flat = Vec::new();
    let mut stack = vec![(root, None)];
    while let Some((raw, parent)) = stack.pop() {
        let index = flat.len();
        flat.push(FlatNode { raw, parent });
        // Reversed so the first child is popped first.
        for child in raw.children.iter().rev() {
            stack.push((child, Some(index)));
        }
    }
    flat
}

fn fallback_name(raw: &RawSpatialNode) -> String {
    if raw.type_name.trim().is_empty() {
        UNNAMED.to_string()
    } else {
        raw.type_name.clone()
    }
}

/// Builds a [`SpatialNode`] tree for one loaded model.
pub struct SpatialTreeBuilder<'a> {
    engine: &'a dyn Engine,
    model: ModelId,
    timeout: Duration,
    concurrency: usize,
}

impl<'a> SpatialTreeBuilder<'a> {
    pub fn new(engine: &'a dyn Engine, model: ModelId) -> Self {
        Self {
            engine,
            model,
            timeout: NAME_LOOKUP_TIMEOUT,
            concurrency: NAME_LOOKUP_CONCURRENCY,
        }
    }

    pub fn from_config(engine: &'a dyn Engine, model: ModelId, config: &ViewerConfig) -> Self {
        Self::new(engine, model)
            .timeout(config.name_lookup_timeout)
            .concurrency(config.name_lookup_concurrency)
    }

    /// Per-lookup time limit.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Lookups in flight at once. Clamped to at least one.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Resolves the whole tree. Never fails: every lookup problem degrades to
    /// a fallback name.
    pub async fn build(&self, root: &RawSpatialNode) -> SpatialNode {
        let flat = flatten(root);
        let mut names: Vec<String> = flat.iter().map(|n| fallback_name(n.raw)).collect();

        let lookups = flat
            .iter()
            .enumerate()
            .filter_map(|(index, node)| node.raw.element_id.map(|id| (index, id)));
        let resolved: Vec<(usize, Option<String>)> = stream::iter(lookups)
            .map(|(index, id)| async move { (index, self.lookup_name(id).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut fallbacks = 0usize;
        let lookups = resolved.len();
        for (index, name) in resolved {
            match name {
                Some(name) => names[index] = name,
                None => fallbacks += 1,
            }
        }
        debug!(
            model = %self.model,
            nodes = flat.len(),
            lookups,
            fallbacks,
            "Spatial tree resolved"
        );

        assemble(&flat, names)
    }

    async fn lookup_name(&self, element: ElementId) -> Option<String> {
        let lookup = self.engine.item_properties(self.model, element);
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(props)) => props.name().map(str::to_owned),
            Ok(Err(e)) => {
                debug!(element = %element, error = %e, "Name lookup failed");
                None
            }
            Err(_) => {
                debug!(element = %element, timeout_ms = self.timeout.as_millis() as u64, "Name lookup timed out");
                None
            }
        }
    }
}

/// Rebuilds the hierarchy bottom-up from the pre-order list.
fn assemble(flat: &[FlatNode<'_>], names: Vec<String>) -> SpatialNode {
    let mut children_of: Vec<Vec<SpatialNode>> = (0..flat.len()).map(|_| Vec::new()).collect();
    let mut names: Vec<Option<String>> = names.into_iter().map(Some).collect();

    // Descendants come after their ancestors in pre-order, so walking
    // backwards finishes every child before its parent.
    for index in (0..flat.len()).rev() {
        let mut children = std::mem::take(&mut children_of[index]);
        children.reverse();
        let node = SpatialNode {
            name: names[index].take().unwrap_or_default(),
            element_id: flat[index].raw.element_id,
            children,
        };
        match flat[index].parent {
            Some(parent) => children_of[parent].push(node),
            None => return node,
        }
    }

    SpatialNode::new(UNNAMED, None)
}
