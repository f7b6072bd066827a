// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Identifiers and small value types shared by the engine and its callers.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine-assigned id of a loaded model.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ModelId(pub u32);

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ModelId {
    fn from(id: u32) -> Self {
        ModelId(id)
    }
}

/// Engine-assigned id of one constructible element (the IFC express id).
///
/// Only unique together with its [`ModelId`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ElementId(pub u32);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ElementId {
    fn from(id: u32) -> Self {
        ElementId(id)
    }
}

/// Result of a successful ray pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickResult {
    pub model_id: ModelId,
    pub element_id: ElementId,
}

/// Where a model comes from: a URL the engine can fetch, or an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Url(String),
    Bytes { name: String, data: Vec<u8> },
}

impl ModelSource {
    pub fn url(url: impl Into<String>) -> Self {
        ModelSource::Url(url.into())
    }

    pub fn bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        ModelSource::Bytes {
            name: name.into(),
            data,
        }
    }

    /// Short label used in logs and catalog lookups.
    pub fn label(&self) -> &str {
        match self {
            ModelSource::Url(url) => url,
            ModelSource::Bytes { name, .. } => name,
        }
    }
}

/// Axis-aligned bounding box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Bounds {
    /// Creates a box from two corners, normalizing their order per axis.
    pub fn new(a: Point3<f64>, b: Point3<f64>) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Cube with the given half extent centered on `center`.
    pub fn around(center: Point3<f64>, half_extent: f64) -> Self {
        let h = Vector3::new(half_extent, half_extent, half_extent);
        Self::new(center - h, center + h)
    }

    #[inline]
    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// Union of an iterator of boxes, `None` when it is empty.
    pub fn union_all<'a>(boxes: impl IntoIterator<Item = &'a Bounds>) -> Option<Bounds> {
        boxes
            .into_iter()
            .fold(None, |acc: Option<Bounds>, b| match acc {
                Some(acc) => Some(acc.union(b)),
                None => Some(*b),
            })
    }
}
