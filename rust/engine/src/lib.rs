// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # IFC-Share Engine
//!
//! Backend-neutral facade over the 3D engine that owns a loaded IFC scene.
//!
//! The viewer core never holds scene objects directly. Everything it touches
//! (models, subsets, highlights) lives inside the engine, which acts as the
//! arena; callers only keep ids and [`SubsetHandle`]s into it.
//!
//! ## Overview
//!
//! - [`Engine`]: the async interface consumed by the viewer core
//! - [`PropertyBag`] / [`PropertyValue`]: typed view of the engine's dynamic
//!   property records
//! - [`RawSpatialNode`]: the containment hierarchy as the engine reports it
//! - [`MemoryEngine`]: headless in-memory engine for tests and demos
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ifc_share_engine::{Engine, MemoryEngine, MemoryModel, MemoryElement, ModelSource};
//!
//! let engine = MemoryEngine::new();
//! engine.register(
//!     "tower.ifc",
//!     MemoryModel::new()
//!         .element(MemoryElement::new(10, "IFCWALL").named("Core wall"))
//!         .element(MemoryElement::new(11, "IFCSLAB")),
//! );
//!
//! let model = engine.load_model(&ModelSource::url("tower.ifc")).await?;
//! let ids = engine.all_element_ids(model).await?;
//! assert_eq!(ids.len(), 2);
//! ```

pub mod engine;
pub mod error;
pub mod memory;
pub mod properties;
pub mod spatial;
pub mod subset;
pub mod types;

pub use engine::Engine;
pub use error::{Error, Result};
pub use memory::{HighlightCall, MemoryElement, MemoryEngine, MemoryModel, SubsetSnapshot};
pub use properties::{PropertyBag, PropertyValue};
pub use spatial::RawSpatialNode;
pub use subset::{MaterialOverride, SubsetHandle, SubsetKey, SubsetRequest};
pub use types::{Bounds, ElementId, ModelId, ModelSource, PickResult};
