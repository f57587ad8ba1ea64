//! Whole-world scenarios exercising several parts of the engine together.

use super::*;
use crate::physics::{
    collision::{BruteForce, Shape},
    joint::DistanceLimit,
};

const DT: f64 = 1.0 / 60.0;

fn world_without_gravity() -> PhysicsWorld {
    PhysicsWorld::new(WorldParams::default().with_gravity([0.0, 0.0]))
}

/// A 20x1 static floor with its top at `y = 0`.
fn add_floor(world: &mut PhysicsWorld) -> (BodyKey, FixtureKey) {
    let body = world.add_body(Body::new_static().with_position([0.0, -0.5]));
    let fixture = world
        .add_fixture(body, Shape::rect(20.0, 1.0).unwrap())
        .unwrap();
    (body, fixture)
}

fn add_box(world: &mut PhysicsWorld, position: [f64; 2]) -> BodyKey {
    let body = world.add_body(Body::new_dynamic().with_position(position));
    world
        .add_fixture(body, Shape::rect(1.0, 1.0).unwrap())
        .unwrap();
    body
}

fn count_events(events: &[Event], pred: impl Fn(&Event) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

#[test]
fn elastic_circles_swap_velocities() {
    let mut world = world_without_gravity();
    let mut add_ball = |x: f64, vx: f64| {
        let body = world.add_body(Body::new_dynamic().with_position([x, 0.0]).with_velocity(
            Velocity {
                linear: m::Vec2::new(vx, 0.0),
                angular: 0.0,
            },
        ));
        world
            .add_fixture(
                body,
                FixtureBuilder::new(Shape::circle(1.0).unwrap())
                    .with_friction(0.0)
                    .with_restitution(1.0),
            )
            .unwrap();
        body
    };
    let left = add_ball(-1.2, 10.0);
    let right = add_ball(1.2, -10.0);

    let mut events = Vec::new();
    for _ in 0..10 {
        world.step(DT);
        events.extend(world.drain_events());
    }

    let v_left = world.get_body(left).unwrap().linear_velocity();
    let v_right = world.get_body(right).unwrap().linear_velocity();
    assert!((v_left.x + 10.0).abs() < 1e-9, "left ball: {:?}", v_left);
    assert!((v_right.x - 10.0).abs() < 1e-9, "right ball: {:?}", v_right);
    assert!((v_left + v_right).mag() < 1e-9);
    assert!(v_left.y.abs() < 1e-9);

    assert_eq!(
        count_events(&events, |e| matches!(e, Event::ContactBegan { .. })),
        1
    );
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::ContactEnded { .. })),
        1
    );
}

#[test]
fn box_comes_to_rest_on_floor() {
    let mut world = PhysicsWorld::default();
    add_floor(&mut world);
    let b = add_box(&mut world, [0.0, 0.5]);

    for _ in 0..120 {
        world.step(DT);
    }

    let body = world.get_body(b).unwrap();
    let penetration = 0.5 - body.position().y;
    assert!(penetration < 0.05, "sank by {}", penetration);
    assert!(penetration > -0.05, "floating by {}", -penetration);
    assert!(body.linear_velocity().mag() < 1e-2);
    assert!(body.angle().abs() < 1e-2);
}

#[test]
fn resting_contact_impulses_carry_the_weight() {
    let sleep = SleepParams {
        enabled: false,
        ..Default::default()
    };
    let mut world = PhysicsWorld::new(WorldParams::default().with_sleep(sleep));
    add_floor(&mut world);
    let b = add_box(&mut world, [0.0, 0.5]);

    for _ in 0..120 {
        world.step(DT);
    }

    let (_, contact) = world.contacts().of_body(b).next().unwrap();
    assert!(contact.is_touching());
    assert_eq!(contact.manifold().point_count(), 2);
    assert!(contact.manifold().points().all(|p| p.normal_impulse > 0.0));
    // the impulses stored for warm starting hold up a unit mass for one step
    let total: f64 = contact.manifold().points().map(|p| p.normal_impulse).sum();
    assert!((total - 10.0 * DT).abs() < 0.02, "total impulse {}", total);
}

#[test]
fn accumulated_impulses_carry_over_between_steps() {
    let sleep = SleepParams {
        enabled: false,
        ..Default::default()
    };
    let mut world = PhysicsWorld::new(WorldParams::default().with_sleep(sleep));
    add_floor(&mut world);
    let b = add_box(&mut world, [0.0, 0.5]);
    for _ in 0..120 {
        world.step(DT);
    }

    let impulses = |world: &PhysicsWorld| {
        let (_, contact) = world.contacts().of_body(b).next().unwrap();
        let mut points: Vec<_> = contact
            .manifold()
            .points()
            .map(|p| (p.id.key(), p.normal_impulse, p.tangent_impulse))
            .collect();
        points.sort_by_key(|p| p.0);
        points
    };
    let settled = impulses(&world);
    assert_eq!(settled.len(), 2);

    // without solver iterations, the only impulses applied are the warm start
    world.params.solver.iterations = 0;
    world.step(DT);
    let carried = impulses(&world);
    itertools::assert_equal(
        carried.iter().map(|p| p.0),
        settled.iter().map(|p| p.0),
    );
    for (old, new) in settled.iter().zip(&carried) {
        assert!(new.1 > 0.0);
        assert!((new.1 - old.1).abs() < 1e-12);
        assert!((new.2 - old.2).abs() < 1e-12);
    }

    world.params.solver.warm_starting = false;
    world.step(DT);
    assert!(impulses(&world).iter().all(|p| p.1 == 0.0 && p.2 == 0.0));
}

#[test]
fn breaking_joint_reports_once() {
    let mut world = world_without_gravity();
    let b = world.add_body(Body::new_dynamic().with_position([0.0, -1.0]));
    world
        .add_fixture(b, Shape::circle(0.25).unwrap())
        .unwrap();
    let joint = world
        .add_joint(
            JointBuilder::new(b)
                .with_target_anchor(m::Vec2::zero())
                .with_breakpoint(0.5)
                .build_distance(1.0, DistanceLimit::Exact),
        )
        .unwrap();

    world.step(DT);
    assert_eq!(world.drain_events().count(), 0);
    assert!(world.joints().get(joint).unwrap().is_enabled());

    world
        .get_body_mut(b)
        .unwrap()
        .set_pose(m::Vec2::new(0.0, -3.0), 0.0);
    let mut events = Vec::new();
    for _ in 0..10 {
        world.step(DT);
        events.extend(world.drain_events());
    }

    assert_eq!(events.len(), 1);
    match events[0] {
        Event::JointBroke { joint: broken, error } => {
            assert_eq!(broken, joint);
            assert!((error - 2.0).abs() < 1e-9);
        }
        other => panic!("unexpected event {:?}", other),
    }
    let j = world.joints().get(joint).unwrap();
    assert!(j.is_broken());
    assert!(!j.is_enabled());
    // a broken joint no longer pulls
    assert_eq!(world.get_body(b).unwrap().linear_velocity(), m::Vec2::zero());
}

#[test]
fn removal_is_deferred_to_the_next_step() {
    let mut world = PhysicsWorld::default();
    add_floor(&mut world);
    let b = add_box(&mut world, [0.0, 0.5]);
    let joint = world
        .add_joint(
            JointBuilder::new(b)
                .with_target_anchor(m::Vec2::new(0.0, 0.5))
                .build_revolute(),
        )
        .unwrap();
    for _ in 0..5 {
        world.step(DT);
    }
    world.drain_events().for_each(drop);
    assert_eq!(world.contacts().len(), 1);

    assert!(world.remove_body(b));
    assert!(!world.remove_body(b));
    // still there until the next step
    assert!(world.get_body(b).unwrap().is_disposed());
    assert!(world.joints().get(joint).is_some());
    assert_eq!(
        world.add_joint(JointBuilder::new(b).build_weld()),
        Err(PhysicsError::BodyDisposed)
    );

    world.step(DT);
    assert!(world.get_body(b).is_none());
    assert!(world.joints().get(joint).is_none());
    assert!(world.contacts().is_empty());
    let events: Vec<Event> = world.drain_events().collect();
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::ContactEnded { .. })),
        1
    );
    assert_eq!(
        world.add_joint(JointBuilder::new(b).build_weld()),
        Err(PhysicsError::NoSuchBody)
    );
}

#[test]
fn resting_box_sleeps_and_wakes_when_floor_goes() {
    let mut world = PhysicsWorld::default();
    let (_, floor) = add_floor(&mut world);
    let b = add_box(&mut world, [0.0, 0.5]);

    for _ in 0..240 {
        world.step(DT);
    }
    assert!(!world.get_body(b).unwrap().is_awake());

    assert!(world.remove_fixture(floor));
    world.step(DT);
    assert!(world.get_body(b).unwrap().is_awake());
    for _ in 0..30 {
        world.step(DT);
    }
    assert!(world.get_body(b).unwrap().position().y < 0.0);
}

#[test]
fn sensors_report_but_do_not_push() {
    let mut world = PhysicsWorld::default();
    let sensor_body = world.add_body(Body::new_static());
    world
        .add_fixture(
            sensor_body,
            FixtureBuilder::new(Shape::circle(1.0).unwrap()).with_sensor(true),
        )
        .unwrap();
    let b = add_box(&mut world, [0.0, 3.0]);

    let mut events = Vec::new();
    for _ in 0..120 {
        world.step(DT);
        events.extend(world.drain_events());
    }

    let body = world.get_body(b).unwrap();
    assert!(body.position().y < -2.0);
    assert!((body.linear_velocity().y + 120.0 * DT * 10.0).abs() < 1e-9);
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::ContactBegan { .. })),
        1
    );
    assert_eq!(
        count_events(&events, |e| matches!(e, Event::ContactEnded { .. })),
        1
    );
}

struct NothingCollides;
impl ContactFilter for NothingCollides {
    fn should_collide(&self, _: &Fixture, _: &Fixture) -> bool {
        false
    }
}

#[test]
fn filters_keep_bodies_apart() {
    // negative groups never collide
    let mut world = world_without_gravity();
    let filter = CollisionFilter {
        group: -1,
        ..Default::default()
    };
    for x in [0.0, 0.5] {
        let b = world.add_body(Body::new_dynamic().with_position([x, 0.0]));
        world
            .add_fixture(
                b,
                FixtureBuilder::new(Shape::rect(1.0, 1.0).unwrap()).with_filter(filter),
            )
            .unwrap();
    }
    world.step(DT);
    assert!(world.contacts().is_empty());

    // neither do bodies connected by a joint
    let mut world = world_without_gravity();
    let a = add_box(&mut world, [0.0, 0.0]);
    let b = add_box(&mut world, [0.5, 0.0]);
    world
        .add_joint(JointBuilder::new(a).with_target(b).build_revolute())
        .unwrap();
    world.step(DT);
    assert!(world.contacts().is_empty());

    // or anything rejected by a custom filter
    let mut world = world_without_gravity();
    world.set_contact_filter(NothingCollides);
    add_box(&mut world, [0.0, 0.0]);
    add_box(&mut world, [0.5, 0.0]);
    world.step(DT);
    assert!(world.contacts().is_empty());

    world.clear_contact_filter();
    world.step(DT);
    world.step(DT);
    assert_eq!(world.contacts().len(), 1);
}

#[test]
fn pendulum_stays_on_its_pivot() {
    let mut world = PhysicsWorld::default();
    let b = add_box(&mut world, [1.0, 0.0]);
    world
        .add_joint(
            JointBuilder::new(b)
                .with_anchor(m::Vec2::new(-1.0, 0.0))
                .build_revolute(),
        )
        .unwrap();

    for _ in 0..120 {
        world.step(DT);
    }

    let body = world.get_body(b).unwrap();
    let pivot = body.world_point(m::Vec2::new(-1.0, 0.0));
    assert!(pivot.mag() < 0.05, "pivot drifted to {:?}", pivot);
    // it has swung down from the horizontal
    assert!(body.position().y < -0.1);
}

/// A body whose only fixture sits one unit to the right of its origin.
fn add_lopsided_body(world: &mut PhysicsWorld, angular_velocity: f64) -> BodyKey {
    let body = world.add_body(Body::new_dynamic().with_velocity(Velocity {
        linear: m::Vec2::zero(),
        angular: angular_velocity,
    }));
    world
        .add_fixture(body, Shape::circle_at(m::Vec2::new(1.0, 0.0), 0.25).unwrap())
        .unwrap();
    body
}

#[test]
fn off_center_mass_swings_around_a_pivot_at_the_origin() {
    let mut world = PhysicsWorld::default();
    let b = add_lopsided_body(&mut world, 0.0);
    world.add_joint(JointBuilder::new(b).build_revolute()).unwrap();

    // about a quarter swing
    for _ in 0..30 {
        world.step(DT);
    }

    let body = world.get_body(b).unwrap();
    assert!(body.angle() < -0.5, "angle = {}", body.angle());
    assert!(body.position().mag() < 0.05, "pivot drifted to {:?}", body.position());
    let arm = body.world_centroid() - body.position();
    assert!((arm.mag() - 1.0).abs() < 0.05);
    assert!(body.world_centroid().y < -0.5);
}

#[test]
fn free_body_spins_around_its_center_of_mass() {
    let mut world = world_without_gravity();
    let b = add_lopsided_body(&mut world, 3.0);

    for _ in 0..30 {
        world.step(DT);
    }

    let body = world.get_body(b).unwrap();
    let centroid = m::Vec2::new(1.0, 0.0);
    assert!(
        (body.world_centroid() - centroid).mag() < 1e-9,
        "center of mass moved to {:?}",
        body.world_centroid()
    );
    assert!((body.angle() - 1.5).abs() < 1e-9);
    // the origin is carried around the center of mass
    let origin = centroid - m::Vec2::new(1.5f64.cos(), 1.5f64.sin());
    assert!((body.position() - origin).mag() < 1e-9);
    assert!((body.world_point(m::Vec2::new(1.0, 0.0)) - centroid).mag() < 1e-9);
}

#[test]
fn queries_find_fixtures() {
    let mut world = world_without_gravity();
    let square_body = world.add_body(Body::new_static());
    let square = world
        .add_fixture(square_body, Shape::rect(1.0, 1.0).unwrap())
        .unwrap();
    let ball_body = world.add_body(Body::new_static().with_position([3.0, 0.0]));
    let ball = world
        .add_fixture(ball_body, Shape::circle(0.5).unwrap())
        .unwrap();
    // fixtures enter the broad phase during a step
    world.step(DT);

    let region = AABB::new(m::Vec2::new(-1.0, -1.0), m::Vec2::new(1.0, 1.0));
    assert_eq!(world.query_aabb(&region), vec![square]);

    assert_eq!(world.collide_at(m::Vec2::new(3.2, 0.1)), Some(ball));
    assert_eq!(world.collide_at(m::Vec2::new(0.1, 0.1)), Some(square));
    assert_eq!(world.collide_at(m::Vec2::new(1.5, 0.0)), None);

    let (start, end) = (m::Vec2::new(-5.0, 0.0), m::Vec2::new(5.0, 0.0));
    let hit = world.ray_cast(start, end, |_| true).unwrap();
    assert_eq!(hit.fixture, square);
    assert_eq!(hit.body, square_body);
    assert!((hit.point.x + 0.5).abs() < 0.01);
    assert!((hit.normal - m::Vec2::new(-1.0, 0.0)).mag() < 1e-6);

    let hit = world
        .ray_cast(start, end, |f| f.shape().child_count() == 1 && f.body() == ball_body)
        .unwrap();
    assert_eq!(hit.fixture, ball);
    assert!((hit.fraction - 0.75).abs() < 1e-9);

    let all = world.ray_cast_all(start, end);
    itertools::assert_equal(all.iter().map(|h| h.fixture), [square, ball]);

    assert!(world
        .ray_cast(start, m::Vec2::new(-4.0, 0.0), |_| true)
        .is_none());
}

#[test]
fn zero_timestep_does_nothing() {
    let mut world = PhysicsWorld::default();
    let b = add_box(&mut world, [0.0, 5.0]);
    world.step(0.0);
    let body = world.get_body(b).unwrap();
    assert_eq!(body.position(), m::Vec2::new(0.0, 5.0));
    assert_eq!(body.linear_velocity(), m::Vec2::zero());
}

#[test]
fn broad_phase_can_only_be_swapped_when_empty() {
    let mut world = PhysicsWorld::default();
    add_floor(&mut world);
    assert_eq!(
        world.set_broad_phase(BruteForce::new(Default::default())),
        Err(PhysicsError::BroadPhaseInUse)
    );

    world.clear();
    world
        .set_broad_phase(BruteForce::new(Default::default()))
        .unwrap();
    add_floor(&mut world);
    add_box(&mut world, [0.0, 0.6]);
    for _ in 0..30 {
        world.step(DT);
    }
    assert_eq!(world.contacts().len(), 1);
    assert!(world.contacts().iter().all(|(_, c)| c.is_touching()));
}

#[test]
fn joints_need_two_live_bodies() {
    let mut world = PhysicsWorld::default();
    let a = add_box(&mut world, [0.0, 0.0]);
    assert_eq!(
        world.add_joint(JointBuilder::new(a).with_target(a).build_revolute()),
        Err(PhysicsError::SelfJoint)
    );
    let mut other = PhysicsWorld::default();
    other.add_body(Body::new_dynamic());
    let stranger = other.add_body(Body::new_dynamic());
    assert_eq!(
        world.add_joint(JointBuilder::new(a).with_target(stranger).build_weld()),
        Err(PhysicsError::NoSuchBody)
    );
}

#[test]
fn diagnostics_only_when_enabled() {
    let mut world = PhysicsWorld::default();
    add_floor(&mut world);
    add_box(&mut world, [0.0, 10.0]);
    world.step(DT);
    assert!(world.diagnostics().is_none());

    world.params.enable_diagnostics = true;
    world.step(DT);
    let diag = world.diagnostics().unwrap();
    assert_eq!(diag.awake_bodies, 1);
    assert_eq!(diag.proxies, 2);
    assert_eq!(diag.contacts, 0);
    assert!(diag.total >= diag.impulse_solving);
}

#[test]
fn fluid_controller_reports_through_world() {
    let mut world = world_without_gravity();
    let b = add_box(&mut world, [0.0, -1.0]);
    let region = AABB::new(m::Vec2::new(-5.0, -5.0), m::Vec2::new(5.0, 0.0));
    let fluid = world.add_controller(FluidDrag::new(region, 1.0, m::Vec2::new(0.0, -10.0)));

    world.step(DT);
    let events: Vec<Event> = world.drain_events().collect();
    assert_eq!(events, vec![Event::FluidEntered { body: b }]);
    // fully submerged with the density of the fluid, pushed up by its weight
    assert!(world.get_body(b).unwrap().linear_velocity().y > 0.0);

    assert!(world.remove_controller(fluid).is_some());
    let events: Vec<Event> = world.drain_events().collect();
    assert_eq!(events, vec![Event::FluidLeft { body: b }]);
    assert!(world.remove_controller(fluid).is_none());
}

#[test]
fn frame_pressure_slows_the_simulation_down() {
    let mut world = PhysicsWorld::default();
    let mut simulated = DT;
    for _ in 0..20 {
        simulated = world.step_with_real_dt(DT, 10.0 * DT);
    }
    assert!(simulated < DT);
    assert!(world.timestep_scale() < 1.0);

    world.params.timestep = TimestepScaling::disabled();
    assert_eq!(world.step_with_real_dt(DT, 10.0 * DT), DT);
}
