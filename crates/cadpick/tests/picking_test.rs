//! Multi-node picking through the handler, on the CPU renderer.

mod common;

use std::sync::Arc;

use cadpick::*;
use common::{
    camera, center_input, cube_at, render_count, rendered_nodes, surface, visibility_snapshots, Event,
    RecordingRenderer,
};
use futures::executor::block_on;
use futures::future::join;
use futures::FutureExt;

#[test]
fn test_hits_are_sorted_nearest_first() {
    let (renderer, _) = RecordingRenderer::new();
    let handler = PickingHandler::new(renderer);
    let nodes = [cube_at("far", 5.0, 5), cube_at("near", 1.0, 1), cube_at("middle", 3.0, 3)];

    let hits = block_on(handler.intersect_nodes(&nodes, &center_input())).unwrap();

    let names: Vec<&str> = hits.iter().map(|hit| hit.node.name()).collect();
    assert_eq!(names, ["near", "middle", "far"]);
    for (hit, expected) in hits.iter().zip([1.0, 3.0, 5.0]) {
        assert!((hit.distance - expected).abs() < 0.01, "{} at {}", hit.node.name(), hit.distance);
        assert_eq!(f64::from(hit.tree_index), expected);
    }
}

#[test]
fn test_end_to_end_point_and_tree_index() {
    let (renderer, _) = RecordingRenderer::new();
    let handler = PickingHandler::new(renderer);
    let mesh = TriangleMesh::cuboid(Vec3::new(0.0, 0.0, -5.0), Vec3::ONE, 42).unwrap();
    let node = Arc::new(ModelNode::new("part", mesh));

    let input = PickInput::from_pixel(32.0, 24.0, camera(), surface());
    let hits = handler.intersect_nodes_blocking(&[Arc::clone(&node)], &input).unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].tree_index, 42);
    assert!((hits[0].point.z + 4.0).abs() < 0.05, "point = {:?}", hits[0].point);
    assert!(hits[0].point.x.abs() < 0.05 && hits[0].point.y.abs() < 0.05);
}

#[test]
fn test_empty_node_list_touches_nothing() {
    let (renderer, events) = RecordingRenderer::new();
    let handler = PickingHandler::new(renderer);

    let hits = block_on(handler.intersect_nodes(&[], &center_input())).unwrap();

    assert!(hits.is_empty());
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn test_miss_returns_empty() {
    let (renderer, events) = RecordingRenderer::new();
    let handler = PickingHandler::new(renderer);
    let node = cube_at("beside", 3.0, 7);

    let input = PickInput::new(Vec2::new(0.9, 0.9), camera(), surface());
    let hits = block_on(handler.intersect_nodes(&[node], &input)).unwrap();

    assert!(hits.is_empty());
    // The bounds test already rejects the node.
    assert_eq!(render_count(&events), 0);
}

#[test]
fn test_off_surface_coordinates_miss() {
    let (renderer, _) = RecordingRenderer::new();
    let handler = PickingHandler::new(renderer);
    let input = PickInput::new(Vec2::new(0.0, 1.5), camera(), surface());

    let hits = block_on(handler.intersect_nodes(&[cube_at("box", 2.0, 1)], &input)).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn test_empty_surface_is_rejected() {
    let (renderer, _) = RecordingRenderer::new();
    let handler = PickingHandler::new(renderer);
    let input = PickInput::new(Vec2::ZERO, camera(), SurfaceSize::new(64, 0));

    let result = block_on(handler.intersect_nodes(&[cube_at("box", 2.0, 1)], &input));
    assert!(matches!(result, Err(PickError::EmptySurface { height: 0, .. })));
}

#[test]
fn test_hidden_nodes_are_skipped() {
    let (renderer, events) = RecordingRenderer::new();
    let handler = PickingHandler::new(renderer);
    let hidden = cube_at("hidden", 1.0, 1);
    hidden.set_visible(false);
    let shown = cube_at("shown", 2.0, 2);

    let hits = block_on(handler.intersect_nodes(&[Arc::clone(&hidden), Arc::clone(&shown)], &center_input())).unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].node.name(), "shown");
    assert!(!hidden.is_visible());
    assert!(rendered_nodes(&events).iter().flatten().all(|id| *id != hidden.id()));
}

#[test]
fn test_state_is_restored_after_pick() {
    let (renderer, _) = RecordingRenderer::new();
    let handler = PickingHandler::new(renderer);
    let root = SceneGroup::new("root");
    let nodes = [cube_at("a", 1.0, 1), cube_at("b", 2.0, 2), cube_at("c", 20.0, 3)];
    for node in &nodes[..2] {
        root.add(node);
    }
    nodes[1].set_render_mode(RenderMode::TreeIndex);

    let hits = block_on(handler.intersect_nodes(&nodes, &center_input())).unwrap();
    assert_eq!(hits.len(), 3);

    assert_eq!(nodes[0].render_mode(), RenderMode::Normal);
    assert_eq!(nodes[1].render_mode(), RenderMode::TreeIndex);
    assert_eq!(nodes[2].render_mode(), RenderMode::Normal);
    assert!(nodes.iter().all(|node| node.is_visible()));
    assert!(Arc::ptr_eq(&nodes[0].parent().unwrap(), &root));
    assert!(Arc::ptr_eq(&nodes[1].parent().unwrap(), &root));
    assert!(nodes[2].parent().is_none());
    assert_eq!(root.len(), 2);
}

#[test]
fn test_state_is_restored_after_render_error() {
    let (renderer, events) = RecordingRenderer::failing_on(RenderMode::Depth);
    let handler = PickingHandler::new(renderer);
    let root = SceneGroup::new("root");
    let nodes = [cube_at("a", 1.0, 1), cube_at("b", 2.0, 2)];
    for node in &nodes {
        root.add(node);
    }

    let result = block_on(handler.intersect_nodes(&nodes, &center_input()));

    assert!(matches!(result, Err(PickError::Render(RenderError::RenderFailed(_)))));
    // Tree-index pass succeeded, the depth pass failed, nothing after it ran.
    assert_eq!(render_count(&events), 2);
    for node in &nodes {
        assert_eq!(node.render_mode(), RenderMode::Normal);
        assert!(node.is_visible());
        assert!(Arc::ptr_eq(&node.parent().unwrap(), &root));
    }
    assert_eq!(root.len(), 2);
}

#[test]
fn test_concurrent_requests_do_not_interleave() {
    let (renderer, events) = RecordingRenderer::new();
    let handler = PickingHandler::new(renderer);
    let first = [cube_at("a1", 1.0, 1), cube_at("a2", 2.0, 2)];
    let second = [cube_at("b1", 1.5, 3), cube_at("b2", 2.5, 4)];
    let input = center_input();

    let (a, b) = block_on(join(
        handler.intersect_nodes(&first, &input),
        handler.intersect_nodes(&second, &input),
    ));
    assert_eq!(a.unwrap().len(), 2);
    assert_eq!(b.unwrap().len(), 2);

    let first_ids: Vec<NodeId> = first.iter().map(|node| node.id()).collect();
    let passes = rendered_nodes(&events);
    assert_eq!(passes.len(), 8);
    let owners: Vec<bool> = passes
        .iter()
        .map(|pass| {
            assert_eq!(pass.len(), 1);
            first_ids.contains(&pass[0])
        })
        .collect();
    // All of one request's passes run before any of the other's.
    assert_eq!(owners.iter().filter(|&&first| first).count(), 4);
    assert!(owners[..4].iter().all(|&o| o == owners[0]));
    assert!(owners[4..].iter().all(|&o| o != owners[0]));
}

#[test]
fn test_pick_targets_are_pooled() {
    let (renderer, events) = RecordingRenderer::new();
    let handler = PickingHandler::new(renderer);
    let nodes = [cube_at("a", 1.0, 1), cube_at("b", 2.0, 2)];

    for _ in 0..3 {
        block_on(handler.intersect_nodes(&nodes, &center_input())).unwrap();
    }

    let created: Vec<Event> = events
        .lock()
        .unwrap()
        .iter()
        .filter(|event| matches!(event, Event::CreateTarget(..)))
        .cloned()
        .collect();
    assert_eq!(created, [Event::CreateTarget(1, 1)]);
}

#[test]
fn test_blocking_and_deferred_agree() {
    let nodes = [cube_at("a", 1.25, 11), cube_at("b", 4.0, 12)];
    let input = PickInput::new(Vec2::new(0.01, -0.02), camera(), surface());

    let deferred = block_on(PickingHandler::new(RaycastRenderer::new()).intersect_nodes(&nodes, &input)).unwrap();
    let blocking = PickingHandler::new(RaycastRenderer::new())
        .intersect_nodes_blocking(&nodes, &input)
        .unwrap();

    assert_eq!(deferred.len(), blocking.len());
    for (d, b) in deferred.iter().zip(&blocking) {
        assert_eq!(d.tree_index, b.tree_index);
        assert_eq!(d.point, b.point);
    }
}

#[test]
fn test_options_from_json() {
    let options = PickOptions::from_json_str(r#"{ "readback": "blocking", "cache_depth_per_frame": false }"#).unwrap();
    let handler = PickingHandler::with_options(RaycastRenderer::new(), options);

    assert_eq!(handler.options().readback, ReadbackMode::Blocking);
    assert!(!handler.options().cache_depth_per_frame);
    assert!(handler.options().sort_candidates_by_bounds);

    let hits = block_on(handler.intersect_nodes(&[cube_at("box", 2.0, 9)], &center_input())).unwrap();
    assert_eq!(hits[0].tree_index, 9);
}

#[test]
fn test_other_candidates_are_hidden_during_each_pick() {
    let nodes = [cube_at("a", 1.0, 1), cube_at("b", 2.0, 2), cube_at("c", 3.0, 3)];
    let (renderer, events) = RecordingRenderer::watching(&nodes);
    let handler = PickingHandler::new(renderer);

    let hits = block_on(handler.intersect_nodes(&nodes, &center_input())).unwrap();
    assert_eq!(hits.len(), 3);

    let snapshots = visibility_snapshots(&events);
    assert_eq!(snapshots.len(), 6);
    for (pass, visible) in snapshots.iter().enumerate() {
        let expected: Vec<bool> = (0..3).map(|i| i == pass / 2).collect();
        assert_eq!(visible, &expected, "pass {pass}");
    }
    assert!(nodes.iter().all(|node| node.is_visible()));
}

#[test]
fn test_dropped_pick_restores_state() {
    let (renderer, events) = RecordingRenderer::new();
    let handler = PickingHandler::new(renderer);
    let root = SceneGroup::new("root");
    let nodes = [cube_at("a", 1.0, 1), cube_at("b", 2.0, 2), cube_at("hidden", 3.0, 3)];
    for node in &nodes {
        root.add(node);
    }
    nodes[1].set_render_mode(RenderMode::TreeIndex);
    nodes[2].set_visible(false);

    // The deferred readback yields once, so a single poll leaves the
    // first candidate mid-pick.
    let input = center_input();
    let abandoned = handler.intersect_nodes(&nodes, &input).now_or_never();
    assert!(abandoned.is_none());
    assert_eq!(render_count(&events), 1);

    assert_eq!(nodes[0].render_mode(), RenderMode::Normal);
    assert_eq!(nodes[1].render_mode(), RenderMode::TreeIndex);
    assert_eq!(nodes[2].render_mode(), RenderMode::Normal);
    assert!(nodes[0].is_visible());
    assert!(nodes[1].is_visible());
    assert!(!nodes[2].is_visible());
    for node in &nodes {
        assert!(Arc::ptr_eq(&node.parent().unwrap(), &root));
    }
    assert_eq!(root.len(), 3);

    // The lock was released and the pooled target still works.
    let hits = block_on(handler.intersect_nodes(&nodes, &input)).unwrap();
    let names: Vec<&str> = hits.iter().map(|hit| hit.node.name()).collect();
    assert_eq!(names, ["a", "b"]);
}
