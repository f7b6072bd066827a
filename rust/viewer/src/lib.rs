// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # IFC-Share Viewer
//!
//! Interaction core of a collaborative IFC viewer, independent of any renderer.
//!
//! ## Overview
//!
//! - **Spatial tree** ([`tree`]): turns the engine's containment structure into
//!   a display-named tree, resolving names concurrently
//! - **Subset registry** ([`subsets`]): the only owner of show-only and
//!   explode subsets, serialized per subset id
//! - **Explode animator** ([`explode`]): explode/reset state machine and
//!   frame-driven offset interpolation
//! - **Inspection** ([`inspection`], [`comments`]): picking, property lookup,
//!   selection and per-element comments
//! - **Collaboration** ([`collab`]): room-scoped selection sharing over an
//!   injected channel
//! - **Session** ([`session`]): wires everything to one mounted viewer
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ifc_share_engine::{MemoryEngine, ModelSource};
//! use ifc_share_viewer::{collab::RoomHub, ViewerConfig, ViewerSession};
//!
//! let hub = RoomHub::new();
//! let engine = Arc::new(MemoryEngine::new());
//! let session = ViewerSession::mount(engine, Arc::new(hub.connect()), ViewerConfig::default()).await;
//!
//! session.open_model(&ModelSource::url("tower.ifc")).await?;
//! session.toggle_explode().await?;
//! if let Some(hit) = session.click().await? {
//!     session.save_comment("check fire rating");
//! }
//! session.unmount().await;
//! ```

pub mod collab;
pub mod comments;
pub mod config;
pub mod error;
pub mod explode;
pub mod inspection;
pub mod lifecycle;
pub mod session;
pub mod subsets;
pub mod tree;

pub use comments::{Comment, CommentBook};
pub use config::{DirectionPolicy, ViewerConfig};
pub use error::{Result, ViewerError};
pub use explode::{ExplodeAnimator, ExplodePhase};
pub use inspection::{ElementRef, InspectionController, SelectedElement};
pub use lifecycle::Liveness;
pub use session::{LoadedModel, ViewerSession};
pub use subsets::{IsolateOutcome, SubsetRegistry};
pub use tree::{SpatialNode, SpatialTreeBuilder};
