// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end viewer scenarios against the in-memory engine.

use ifc_share_engine::{
    Bounds, ElementId, Engine, MemoryElement, MemoryEngine, MemoryModel, ModelId, ModelSource,
    PickResult, RawSpatialNode,
};
use ifc_share_viewer::collab::{RoomHub, RoomId};
use ifc_share_viewer::{
    DirectionPolicy, ExplodePhase, IsolateOutcome, ViewerConfig, ViewerSession,
};
use nalgebra::{Point3, Vector3};
use std::sync::Arc;
use std::time::Duration;

const SOURCE: &str = "site.ifc";

fn site_model() -> MemoryModel {
    MemoryModel::new()
        .element(
            MemoryElement::new(10, "IFCWALL")
                .named("Wall W1")
                .bounds(Bounds::around(Point3::new(-6.0, 0.0, 0.0), 1.0)),
        )
        .element(
            MemoryElement::new(11, "IFCSLAB")
                .named("Slab S1")
                .bounds(Bounds::around(Point3::new(6.0, 0.0, 0.0), 1.0)),
        )
        .element(
            MemoryElement::new(12, "IFCCOLUMN")
                .bounds(Bounds::around(Point3::new(0.0, 6.0, 0.0), 1.0)),
        )
        .element(
            MemoryElement::new(42, "IFCBEAM")
                .named("Beam B7")
                .bounds(Bounds::around(Point3::new(0.0, 0.0, 6.0), 1.0)),
        )
}

async fn mounted(hub: &RoomHub, config: ViewerConfig) -> (Arc<MemoryEngine>, ViewerSession, ModelId) {
    let engine = Arc::new(MemoryEngine::new());
    engine.register(SOURCE, site_model());
    let session = ViewerSession::mount(engine.clone(), Arc::new(hub.connect()), config).await;
    let model = session.open_model(&ModelSource::url(SOURCE)).await.unwrap().id;
    (engine, session, model)
}

#[tokio::test]
async fn isolating_twice_restores_the_default_view() {
    let hub = RoomHub::new();
    let (engine, session, model) = mounted(&hub, ViewerConfig::default()).await;

    assert_eq!(
        session.select_tree_node(ElementId(11)).await.unwrap(),
        IsolateOutcome::Shown
    );
    assert!(!engine.model_visible(model).unwrap());
    let shown = engine.subset_snapshot(model, "show-only-11").unwrap();
    assert_eq!(shown.element_ids, vec![ElementId(11)]);
    assert!(shown.attached && shown.visible);

    assert_eq!(
        session.select_tree_node(ElementId(11)).await.unwrap(),
        IsolateOutcome::Hidden
    );
    assert!(engine.model_visible(model).unwrap());
    assert!(engine.subset_snapshot(model, "show-only-11").is_none());
}

#[tokio::test(start_paused = true)]
async fn rapid_isolation_keeps_one_subset_per_id() {
    let hub = RoomHub::new();
    let (engine, session, model) = mounted(&hub, ViewerConfig::default()).await;
    engine.set_latency(Duration::from_millis(100));

    let (first, second, third) = tokio::join!(
        session.select_tree_node(ElementId(12)),
        session.select_tree_node(ElementId(12)),
        session.select_tree_node(ElementId(12)),
    );

    assert_eq!(first.unwrap(), IsolateOutcome::Shown);
    assert_eq!(second.unwrap(), IsolateOutcome::Hidden);
    assert_eq!(third.unwrap(), IsolateOutcome::Shown);
    assert_eq!(engine.redundant_creates(), 0);
    assert_eq!(engine.live_subsets(model).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn explode_then_reset_settles_home() {
    let hub = RoomHub::new();
    let (engine, session, model) = mounted(&hub, ViewerConfig::default()).await;

    assert_eq!(session.toggle_explode().await.unwrap(), ExplodePhase::Exploded);
    assert!(session.is_exploded());
    session.settle().await;

    let exploded = engine.live_subsets(model);
    assert_eq!(exploded.len(), 4);
    for subset in &exploded {
        assert!(subset.custom_id.starts_with("explode-"));
        assert_eq!(subset.element_ids.len(), 1);
        assert!(subset.attached && subset.visible);
        assert!(subset.offset.norm() > 0.0);
    }
    assert!(!engine.model_visible(model).unwrap());

    assert_eq!(session.toggle_explode().await.unwrap(), ExplodePhase::Resetting);
    session.settle().await;

    assert!(!session.is_exploded());
    assert!(engine.model_visible(model).unwrap());
    assert!(engine
        .live_subsets(model)
        .iter()
        .all(|s| s.offset == Vector3::zeros()));
}

#[tokio::test(start_paused = true)]
async fn center_policy_pushes_elements_outward() {
    let hub = RoomHub::new();
    let config = ViewerConfig {
        direction_policy: DirectionPolicy::FromCenter,
        explode_distance: 4.0,
        ..ViewerConfig::default()
    };
    let (engine, session, model) = mounted(&hub, config).await;

    session.toggle_explode().await.unwrap();
    session.settle().await;

    let wall = engine.subset_snapshot(model, "explode-10").unwrap();
    let beam = engine.subset_snapshot(model, "explode-42").unwrap();
    assert!(wall.offset.x < 0.0);
    assert!(beam.offset.z > 0.0);
    assert!((wall.offset.norm() - 4.0).abs() < 1e-9);
}

#[tokio::test]
async fn comments_ignore_blank_and_duplicate_text() {
    let hub = RoomHub::new();
    let (engine, session, model) = mounted(&hub, ViewerConfig::default()).await;
    engine.set_pick_target(Some(PickResult {
        model_id: model,
        element_id: ElementId(42),
    }));
    session.click().await.unwrap();

    assert!(!session.save_comment(""));
    assert!(!session.save_comment("   "));
    assert!(session.save_comment("x"));
    assert!(!session.save_comment("x"));

    let comments = session.inspection().comments_for(ElementId(42));
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].element_name, "Beam B7");
}

#[tokio::test]
async fn room_members_see_each_others_picks() {
    let hub = RoomHub::new();
    let (engine_a, session_a, model) = mounted(&hub, ViewerConfig::default()).await;
    let (engine_b, _session_b, _) = mounted(&hub, ViewerConfig::default()).await;
    assert_eq!(hub.members(&RoomId::new("demo-project-room")), 2);

    engine_a.set_pick_target(Some(PickResult {
        model_id: model,
        element_id: ElementId(42),
    }));
    session_a.click().await.unwrap();

    for _ in 0..100 {
        if !engine_b.highlight_calls().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let calls = engine_b.highlight_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].model_id, ModelId(0));
    assert_eq!(calls[0].elements, vec![ElementId(42)]);
    assert!(calls[0].additive && calls[0].clear_previous);
    // The picker neither highlights its own broadcast nor receives it back.
    assert!(engine_a.highlight_calls().is_empty());
}

#[tokio::test]
async fn tree_falls_back_for_unresolvable_names() {
    let hub = RoomHub::new();
    let engine = Arc::new(MemoryEngine::new());
    let structure = RawSpatialNode::new("IFCPROJECT").with_child(
        RawSpatialNode::element("IFCBUILDINGSTOREY", 2).with_children([
            RawSpatialNode::element("IFCWALL", 10),
            RawSpatialNode::element("IFCSLAB", 11),
            RawSpatialNode::element("IFCCOLUMN", 12),
            RawSpatialNode::element("IFCBEAM", 42),
        ]),
    );
    engine.register(SOURCE, site_model().structure(structure));
    engine.fail_properties(11);

    let session = ViewerSession::mount(
        engine.clone(),
        Arc::new(hub.connect()),
        ViewerConfig::default(),
    )
    .await;
    let model = session.open_model(&ModelSource::url(SOURCE)).await.unwrap();

    // 6 nodes; 2 resolve (10, 42), the rest fall back to their type name.
    let names: Vec<&str> = model.tree.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["IFCPROJECT", "IFCBUILDINGSTOREY", "Wall W1", "IFCSLAB", "IFCCOLUMN", "Beam B7"]
    );
    assert!(!engine.is_disposed());
}

#[tokio::test]
async fn unmount_is_final() {
    let hub = RoomHub::new();
    let (engine, session, _) = mounted(&hub, ViewerConfig::default()).await;
    session.unmount().await;

    assert!(engine.is_disposed());
    assert!(session.click().await.is_err());
    assert!(session.full_reset().await.is_err());
}
