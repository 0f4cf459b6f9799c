#![allow(clippy::cast_precision_loss)]
//! Demo picking a small assembly of boxes.
//!
//! Builds a row of parts at different depths, then picks along a horizontal
//! line of cursor positions with the CPU renderer. Pass `--gpu` to use a
//! headless wgpu device instead.
//!
//! Run with `RUST_LOG=debug` to see the handler's log output.

use std::sync::Arc;

use cadpick::{
    ModelNode, PickCamera, PickInput, PickRenderer, PickResult, PickingHandler, RaycastRenderer, SceneGroup,
    SurfaceSize, TriangleMesh, Vec3, WgpuPickRenderer,
};

const SURFACE: SurfaceSize = SurfaceSize {
    width: 800,
    height: 600,
};

fn build_assembly() -> PickResult<(Arc<SceneGroup>, Vec<Arc<ModelNode>>)> {
    let root = SceneGroup::new("assembly");
    let mut parts = Vec::new();
    for i in 0..5u32 {
        let x = i as f32 * 1.5 - 3.0;
        let z = -6.0 - i as f32;
        let mesh = TriangleMesh::cuboid(Vec3::new(x, 0.0, z), Vec3::new(0.5, 0.5 + i as f32 * 0.25, 0.5), 100 + i)?;
        let part = Arc::new(ModelNode::new(format!("part {i}"), mesh));
        root.add(&part);
        parts.push(part);
    }
    Ok((root, parts))
}

fn run<R: PickRenderer>(renderer: R) -> PickResult<()> {
    let (root, parts) = build_assembly()?;
    let camera = PickCamera::look_at(
        Vec3::new(0.0, 2.0, 2.0),
        Vec3::new(0.0, 0.0, -8.0),
        Vec3::Y,
        std::f32::consts::FRAC_PI_4,
        SURFACE.aspect_ratio(),
        0.1,
        100.0,
    );
    let handler = PickingHandler::new(renderer);

    for step in 0..=8 {
        let x = SURFACE.width as f32 * step as f32 / 8.0;
        let input = PickInput::from_pixel(x, SURFACE.height as f32 * 0.5, camera.clone(), SURFACE);
        let hits = pollster::block_on(handler.intersect_nodes(&parts, &input))?;
        match hits.first() {
            Some(hit) => println!(
                "x = {x:5.0}: {} (tree index {}) at ({:.3}, {:.3}, {:.3}), distance {:.3}, {} hit(s)",
                hit.node.name(),
                hit.tree_index,
                hit.point.x,
                hit.point.y,
                hit.point.z,
                hit.distance,
                hits.len()
            ),
            None => println!("x = {x:5.0}: nothing"),
        }
    }

    let input = PickInput::from_pixel(SURFACE.width as f32 * 0.5, SURFACE.height as f32 * 0.5, camera, SURFACE);
    if let Some(point) = pollster::block_on(handler.intersect_point_from_stored_pixel(&parts, &input))? {
        println!("stored depth at the centre: {point:?}");
    }

    println!("{} part(s) still attached to '{}'", root.len(), root.name());
    Ok(())
}

fn main() -> PickResult<()> {
    env_logger::init();

    if std::env::args().any(|arg| arg == "--gpu") {
        let renderer = pollster::block_on(WgpuPickRenderer::new_headless())?;
        run(renderer)
    } else {
        run(RaycastRenderer::new())
    }
}
