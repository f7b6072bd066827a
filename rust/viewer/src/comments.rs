// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-element comments, kept in memory for the lifetime of a session.

use ifc_share_engine::ElementId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Element name recorded when the selection has none.
pub const UNKNOWN_ELEMENT: &str = "Unknown Element";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub text: String,
    pub element_id: ElementId,
    pub element_name: String,
}

/// Comments grouped by stringified element id, in insertion order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct CommentBook {
    by_element: IndexMap<String, Vec<Comment>>,
}

impl CommentBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a comment. Blank text and exact duplicates (after trimming) for
    /// the same element are ignored; returns whether anything was added.
    pub fn add(&mut self, element: ElementId, element_name: Option<&str>, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        let comments = self.by_element.entry(element.to_string()).or_default();
        if comments.iter().any(|c| c.text == text) {
            return false;
        }
        comments.push(Comment {
            text: text.to_string(),
            element_id: element,
            element_name: element_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or(UNKNOWN_ELEMENT)
                .to_string(),
        });
        true
    }

    pub fn for_element(&self, element: ElementId) -> &[Comment] {
        self.by_element
            .get(&element.to_string())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every comment, grouped by element in first-commented order.
    pub fn iter(&self) -> impl Iterator<Item = &Comment> {
        self.by_element.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_element.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
