//! Contact sandbox
//!
//! Drops a few dynamic spheres onto a cooked ground mesh, walks one of
//! them through a trigger zone, and logs the contact activity the world
//! reports. Exercises the whole pipeline: shape cooking and sharing,
//! reactive transform propagation, collider rebuilds, and event-sourced
//! contact state.

use std::sync::Arc;

use atrium_engine::prelude::*;
use log::info;

fn ground_geometry() -> Arc<GeometrySource> {
    Arc::new(
        GeometrySource::new(PositionData::Planar(vec![
            -25.0, 0.0, -25.0, //
            25.0, 0.0, -25.0, //
            25.0, 0.0, 25.0, //
            -25.0, 0.0, 25.0, //
        ]))
        .with_indices(IndexData::U16(vec![0, 1, 2, 0, 2, 3])),
    )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = PhysicsConfig::default();
    let mut world = World::with_backend(config, Box::new(SoftwareBackend::new()));

    // Cook the ground mesh during "loading" so the first tick pays no
    // cooking cost
    let geometry = ground_geometry();
    world.prewarm_shape(&geometry, CookingMode::TriangleMesh);

    let ground = world.spawn();
    world.attach_collider(
        ground,
        ColliderDesc::new(ColliderShape::Mesh {
            geometry: Arc::clone(&geometry),
            mode: CookingMode::TriangleMesh,
        })
        .with_layers(["environment"]),
    )?;

    let zone = world.spawn_at(Vec3::new(0.0, 1.0, 0.0));
    world.attach_collider(
        zone,
        ColliderDesc::new(ColliderShape::Sphere { radius: 1.5 })
            .as_trigger()
            .with_layers(["trigger"])
            .collides_with(["prop"]),
    )?;
    world.on_trigger_enter(
        zone,
        Box::new(|other| info!("trigger zone entered by {other:?}")),
    );
    world.on_trigger_exit(
        zone,
        Box::new(|other| info!("trigger zone left by {other:?}")),
    );

    let mut balls = Vec::new();
    for i in 0..3u32 {
        let x = i as f32 * 3.0 - 3.0;
        let ball = world.spawn_at(Vec3::new(x, 4.0 + x.abs(), 0.0));
        world.attach_collider(
            ball,
            ColliderDesc::new(ColliderShape::Sphere { radius: 0.5 })
                .dynamic()
                .with_layers(["prop"])
                .with_material(PhysicsMaterial {
                    friction: 0.4,
                    restitution: 0.2,
                    density: 1.0,
                }),
        )?;
        world.on_collision_enter(
            ball,
            Box::new(move |other| info!("ball {i} landed on {other:?}")),
        );
        balls.push(ball);
    }

    info!(
        "sandbox running: {} cooked shape(s), backend loaded: {}",
        world.shape_cache().shape_count(),
        world.has_backend()
    );

    let dt = world.config().tick_interval();
    let fall_speed = 2.0;
    for tick in 0..240 {
        // Game logic: constant-speed gravity stand-in, applied through
        // the reactive transform so the physics step sees the change
        for &ball in &balls {
            if let Some(position) = world.position_mut(ball) {
                let y = position.y();
                position.set_y(y - fall_speed * dt);
            }
        }

        // Walk the middle ball through the trigger zone once it has
        // settled on the ground
        if tick == 120 {
            if let Some(position) = world.position_mut(balls[1]) {
                position.set(0.0, 0.6, 0.0);
            }
        }

        world.update(dt);
    }

    for &ball in &balls {
        if let (Some(position), Some(contacts)) = (world.position(ball), world.touching(ball)) {
            info!(
                "ball at ({:.2}, {:.2}, {:.2}) touching {} entit(ies)",
                position.x,
                position.y,
                position.z,
                contacts.touch_count()
            );
        }
    }

    Ok(())
}
