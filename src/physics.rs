//! Rigid body simulation: bodies carrying fixtures, contacts between them,
//! joints, and the world that steps it all forward.

use crate::{error::PhysicsError, math as m};

use std::collections::HashSet;
use thunderdome as td;

//

pub mod body;
pub use body::{Body, BodyBuilder, BodyType, Mass, Velocity};

pub mod collision;
use collision::{query, BroadPhase, FatAabbParams, ProxyOwner, Ray, SweepAndPrune, AABB};

pub mod contact;
use contact::MixRules;
pub use contact::{Contact, ContactFilter, ContactKey, ContactSet};

pub mod diagnostics;
use diagnostics::PhaseTimer;
pub use diagnostics::StepDiagnostics;

mod entity_set;
pub use entity_set::{BodyKey, EntitySet, FixtureKey};

pub mod event;
pub use event::Event;

pub mod fixture;
pub use fixture::{CollisionFilter, Fixture, FixtureBuilder, Material, MixPolicy};

pub mod forcefield;
pub use forcefield::{Controller, FieldController, FluidDrag, ForceField};

pub mod joint;
pub use joint::{Joint, JointBuilder, JointKind, JointTuning};

mod joint_set;
pub use joint_set::{JointKey, JointSet};

pub mod sleep;
pub use sleep::SleepParams;

mod solver;
use solver::{ActiveJoint, ContactConstraint, ContactConstraintPoint, SolverBody, SolverStep};
pub use solver::SolverParams;

pub mod timestep;
use timestep::TimestepState;
pub use timestep::TimestepScaling;

#[cfg(test)]
mod tests;

//

/// Largest distance a body can travel in a single step.
/// Faster bodies have their velocity scaled down.
pub const MAX_TRANSLATION: f64 = 2.0;
/// Largest angle a body can turn in a single step.
pub const MAX_ROTATION: f64 = 0.5 * std::f64::consts::PI;

/// Parameters of a [`PhysicsWorld`].
#[derive(Clone, Copy, Debug)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct WorldParams {
    /// Acceleration applied to every dynamic body, scaled by its `gravity_scale`.
    pub gravity: m::Vec2,
    pub solver: SolverParams,
    pub friction_mix: MixPolicy,
    pub restitution_mix: MixPolicy,
    /// Only read when the broad phase is created.
    pub fat_aabb: FatAabbParams,
    pub sleep: SleepParams,
    pub timestep: TimestepScaling,
    pub enable_diagnostics: bool,
}

impl Default for WorldParams {
    fn default() -> Self {
        Self {
            gravity: m::Vec2::new(0.0, -10.0),
            solver: SolverParams::default(),
            friction_mix: MixPolicy::Average,
            restitution_mix: MixPolicy::Maximum,
            fat_aabb: FatAabbParams::default(),
            sleep: SleepParams::default(),
            timestep: TimestepScaling::default(),
            enable_diagnostics: false,
        }
    }
}

impl WorldParams {
    pub fn with_gravity(mut self, gravity: impl Into<[f64; 2]>) -> Self {
        let [x, y] = gravity.into();
        self.gravity = m::Vec2::new(x, y);
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.solver.iterations = iterations;
        self
    }

    pub fn with_warm_starting(mut self, enabled: bool) -> Self {
        self.solver.warm_starting = enabled;
        self
    }

    pub fn with_solver(mut self, solver: SolverParams) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_mix_policies(mut self, friction: MixPolicy, restitution: MixPolicy) -> Self {
        self.friction_mix = friction;
        self.restitution_mix = restitution;
        self
    }

    pub fn with_fat_aabb(mut self, fat_aabb: FatAabbParams) -> Self {
        self.fat_aabb = fat_aabb;
        self
    }

    pub fn with_sleep(mut self, sleep: SleepParams) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn with_timestep_scaling(mut self, timestep: TimestepScaling) -> Self {
        self.timestep = timestep;
        self
    }

    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.enable_diagnostics = enabled;
        self
    }
}

/// Key of a controller added to the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ControllerKey(td::Index);

/// A ray hitting a fixture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub fixture: FixtureKey,
    pub body: BodyKey,
    pub point: m::Vec2,
    /// Surface normal at the hit point.
    pub normal: m::Vec2,
    /// Fraction of the way from the start to the end of the ray.
    pub fraction: f64,
}

/// The container of everything physical, and the place where the simulation happens.
///
/// Bodies, fixtures and joints are added and removed through the world.
/// Additions take effect immediately, but new fixtures only start colliding
/// at the next step. Removals are deferred to the start of the next step,
/// so keys of removed objects stay valid until then.
pub struct PhysicsWorld {
    pub params: WorldParams,
    entities: EntitySet,
    joints: JointSet,
    contacts: ContactSet,
    broad_phase: Box<dyn BroadPhase>,
    controllers: td::Arena<Box<dyn Controller>>,
    contact_filter: Option<Box<dyn ContactFilter>>,
    events: Vec<Event>,
    diagnostics: StepDiagnostics,
    timestep: TimestepState,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(WorldParams::default())
    }
}

impl PhysicsWorld {
    pub fn new(params: WorldParams) -> Self {
        Self {
            params,
            entities: EntitySet::new(),
            joints: JointSet::new(),
            contacts: ContactSet::new(),
            broad_phase: Box::new(SweepAndPrune::new(params.fat_aabb)),
            controllers: td::Arena::new(),
            contact_filter: None,
            events: Vec::new(),
            diagnostics: StepDiagnostics::default(),
            timestep: TimestepState::default(),
        }
    }

    //
    // stepping
    //

    /// Advance the simulation by `dt` seconds. A zero or negative `dt` does nothing.
    pub fn step(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let _span = tracy_span!("physics step", "step");
        let mut timer = PhaseTimer::start(self.params.enable_diagnostics);

        self.apply_pending_changes();
        self.update_broad_phase();
        let broad_phase = timer.lap();

        self.update_contacts();
        let narrow_phase = timer.lap();

        self.apply_forces(dt);
        self.integrate_velocities(dt);
        let force_application = timer.lap();

        self.solve(dt);
        let impulse_solving = timer.lap();

        self.integrate_positions(dt);
        sleep::update(
            &self.params.sleep,
            dt,
            &mut self.entities,
            &self.contacts,
            &self.joints,
        );
        self.sweep_disposed();
        let position_integration = timer.lap();

        if self.params.enable_diagnostics {
            self.diagnostics = StepDiagnostics {
                broad_phase,
                narrow_phase,
                force_application,
                impulse_solving,
                position_integration,
                total: timer.total(),
                awake_bodies: self
                    .entities
                    .bodies()
                    .filter(|(_, b)| b.is_awake())
                    .count(),
                contacts: self.contacts.len(),
                touching_contacts: self
                    .contacts
                    .iter()
                    .filter(|(_, c)| c.is_touching())
                    .count(),
                joints: self.joints.len(),
                proxies: self.broad_phase.proxy_count(),
            };
        }
    }

    /// Step with a timestep adapted to how long frames actually take,
    /// according to [`WorldParams::timestep`].
    ///
    /// Returns the timestep that was simulated.
    pub fn step_with_real_dt(&mut self, dt: f64, real_dt: f64) -> f64 {
        let effective = self.timestep.effective_dt(&self.params.timestep, dt, real_dt);
        self.step(effective);
        effective
    }

    /// The current multiplier applied by [`step_with_real_dt`][Self::step_with_real_dt].
    pub fn timestep_scale(&self) -> f64 {
        self.timestep.scale()
    }

    fn mix_rules(&self) -> MixRules {
        MixRules {
            friction: self.params.friction_mix,
            restitution: self.params.restitution_mix,
        }
    }

    /// Remove what was disposed since the last step and put new fixtures into the broad phase.
    fn apply_pending_changes(&mut self) {
        let _span = tracy_span!("pending changes", "apply_pending_changes");

        let disposed_fixtures: Vec<FixtureKey> = self
            .entities
            .fixtures
            .iter()
            .filter(|(_, f)| f.disposed)
            .map(|(k, _)| FixtureKey(k))
            .collect();
        for key in disposed_fixtures {
            // whatever rested on the fixture has to notice it's gone
            let touched: Vec<BodyKey> = self
                .contacts
                .iter()
                .filter(|(_, c)| c.touching && !c.is_sensor && c.involves_fixture(key))
                .flat_map(|(_, c)| c.bodies)
                .collect();
            self.contacts.destroy_fixture_contacts(key, &mut self.events);
            self.wake_all(touched);

            if let Some(fixture) = self.entities.fixtures.get_mut(key.0) {
                for proxy in fixture.proxies.drain(..) {
                    self.broad_phase.destroy_proxy(proxy);
                }
            }
        }

        let disposed_bodies: Vec<BodyKey> = self
            .entities
            .bodies
            .iter()
            .filter(|(_, b)| b.disposed)
            .map(|(k, _)| BodyKey(k))
            .collect();
        for body in disposed_bodies {
            let partners: Vec<BodyKey> = self
                .joints
                .iter()
                .filter(|(_, j)| j.involves(body))
                .flat_map(|(_, j)| {
                    let (a, b) = j.bodies();
                    std::iter::once(a).chain(b)
                })
                .collect();
            let removed = self.joints.remove_attached(body);
            if !removed.is_empty() {
                log::debug!("removed {} joints of body {:?}", removed.len(), body);
            }
            self.wake_all(partners);
        }

        let EntitySet {
            bodies, fixtures, ..
        } = &mut self.entities;
        for (idx, fixture) in fixtures.iter_mut() {
            if fixture.disposed || !fixture.proxies.is_empty() {
                continue;
            }
            let Some(body) = bodies.get(fixture.body.0) else {
                continue;
            };
            let pose = body.pose();
            for child in 0..fixture.shape.child_count() {
                let owner = ProxyOwner {
                    fixture: FixtureKey(idx),
                    child,
                };
                let proxy = self
                    .broad_phase
                    .create_proxy(fixture.shape.aabb(child, &pose), owner);
                fixture.proxies.push(proxy);
            }
        }
    }

    fn update_broad_phase(&mut self) {
        let _span = tracy_span!("broad phase", "update_broad_phase");

        let EntitySet {
            bodies, fixtures, ..
        } = &mut self.entities;
        for (_, fixture) in fixtures.iter() {
            if fixture.disposed {
                continue;
            }
            let Some(body) = bodies.get(fixture.body.0) else {
                continue;
            };
            if body.body_type == BodyType::Dynamic && !body.awake {
                continue;
            }
            let pose = body.pose();
            let displacement = body.position - body.prev_position;
            for (child, &proxy) in fixture.proxies.iter().enumerate() {
                self.broad_phase
                    .move_proxy(proxy, fixture.shape.aabb(child, &pose), displacement);
            }
        }
        for (_, body) in bodies.iter_mut() {
            body.prev_position = body.position;
        }

        self.wake_sleepers_near_moving_bodies();

        let update = self.broad_phase.update_pairs();
        for (a, b) in update.removed {
            self.contacts.end(a, b, &mut self.events);
        }
        let mix = self.mix_rules();
        for (a, b) in update.added {
            self.contacts.begin(
                a,
                b,
                &self.entities,
                &self.joints,
                self.contact_filter.as_deref(),
                mix,
            );
        }
    }

    /// Wake sleeping bodies within the activation distance of a body that is moving.
    fn wake_sleepers_near_moving_bodies(&mut self) {
        let sleep = self.params.sleep;
        let any_asleep = self
            .entities
            .bodies
            .iter()
            .any(|(_, b)| b.body_type == BodyType::Dynamic && !b.awake && !b.disposed);
        if !any_asleep {
            return;
        }

        let mut to_wake = Vec::new();
        for (_, fixture) in self.entities.fixtures.iter() {
            if fixture.disposed || fixture.is_sensor {
                continue;
            }
            let Some(body) = self.entities.bodies.get(fixture.body.0) else {
                continue;
            };
            let moving = body.awake
                && body.body_type != BodyType::Static
                && !sleep.is_resting(body);
            if !moving {
                continue;
            }
            let pose = body.pose();
            for child in 0..fixture.shape.child_count() {
                let region = fixture
                    .shape
                    .aabb(child, &pose)
                    .padded(sleep.activation_distance);
                for owner in self.broad_phase.query_aabb(&region) {
                    match self.entities.get_fixture(owner.fixture) {
                        Some(other) if !other.is_sensor && other.body != fixture.body => {
                            to_wake.push(other.body)
                        }
                        _ => {}
                    }
                }
            }
        }
        self.wake_all(to_wake);
    }

    fn update_contacts(&mut self) {
        let mix = self.mix_rules();
        let began = self.contacts.update(
            &self.entities,
            &self.joints,
            self.contact_filter.as_deref(),
            mix,
            &mut self.events,
        );
        let mut to_wake = Vec::new();
        for key in began {
            match self.contacts.get(key) {
                Some(contact) if !contact.is_sensor => to_wake.extend(contact.bodies),
                _ => {}
            }
        }
        self.wake_all(to_wake);
    }

    fn apply_forces(&mut self, dt: f64) {
        let _span = tracy_span!("controllers", "apply_forces");
        for (_, controller) in self.controllers.iter_mut() {
            controller.apply(&mut self.entities, dt, &mut self.events);
        }
    }

    /// Gravity and accumulated forces into velocities, then damping.
    fn integrate_velocities(&mut self, dt: f64) {
        let gravity = self.params.gravity;
        for (_, body) in self.entities.bodies.iter_mut() {
            if body.body_type == BodyType::Dynamic && body.awake && !body.disposed {
                let inv_mass = body.mass.inv();
                let inv_inertia = body.moment_of_inertia.inv();
                body.velocity.linear += dt * (body.gravity_scale * gravity + inv_mass * body.force);
                body.velocity.angular += dt * inv_inertia * body.torque;
                // implicit form of damping, stays stable for large coefficients
                body.velocity.linear *= 1.0 / (1.0 + dt * body.linear_damping);
                body.velocity.angular *= 1.0 / (1.0 + dt * body.angular_damping);
            }
            body.force = m::Vec2::zero();
            body.torque = 0.0;
        }
    }

    fn solve(&mut self, dt: f64) {
        let _span = tracy_span!("solver", "solve");

        self.wake_jointed_bodies();

        let params = self.params.solver;
        let step = SolverStep::new(dt, params.warm_starting);

        // solver bodies are indexed by arena slot, with the world frame at the end
        let ground = self.entities.body_slot_count;
        let mut bodies = vec![SolverBody::ground(); ground + 1];
        for (idx, body) in self.entities.bodies.iter() {
            if !body.disposed {
                bodies[idx.slot() as usize] = SolverBody::from_body(body);
            }
        }
        let movable = |b: &SolverBody| b.inv_mass > 0.0 || b.inv_inertia > 0.0;

        let entities = &self.entities;
        let slot_of = |key: BodyKey| {
            entities
                .get_body(key)
                .filter(|b| !b.disposed)
                .map(|_| key.0.slot() as usize)
        };
        let mut joints = Vec::new();
        for (idx, joint) in self.joints.joints.iter_mut() {
            if !joint.is_enabled() {
                continue;
            }
            let (a, b) = joint.bodies();
            let Some(slot_a) = slot_of(a) else {
                continue;
            };
            let slot_b = match b {
                Some(b) => match slot_of(b) {
                    Some(slot) => slot,
                    None => continue,
                },
                None => ground,
            };
            let pair = [slot_a, slot_b];
            if !movable(&bodies[slot_a]) && !movable(&bodies[slot_b]) {
                continue;
            }
            if !joint.initialized {
                joint.initialize(&bodies, pair);
            }
            joints.push(ActiveJoint {
                key: JointKey(idx),
                joint,
                pair,
            });
        }

        let mut contacts = Vec::new();
        for (idx, contact) in self.contacts.contacts.iter() {
            if !contact.touching || contact.is_sensor {
                continue;
            }
            let pair = contact.bodies.map(|b| b.0.slot() as usize);
            let (body_a, body_b) = (&bodies[pair[0]], &bodies[pair[1]]);
            if !movable(body_a) && !movable(body_b) {
                continue;
            }
            let mut points = [ContactConstraintPoint::default(); 2];
            let mut point_count = 0;
            for (point, manifold_point) in points.iter_mut().zip(contact.manifold.points()) {
                point.r = [
                    manifold_point.position - body_a.centroid,
                    manifold_point.position - body_b.centroid,
                ];
                point.separation = manifold_point.separation;
                point.normal_impulse = manifold_point.normal_impulse;
                point.tangent_impulse = manifold_point.tangent_impulse;
                point_count += 1;
            }
            if point_count == 0 {
                continue;
            }
            contacts.push(ContactConstraint {
                key: ContactKey(idx),
                pair,
                normal: contact.manifold.normal.into_inner(),
                friction: contact.friction,
                restitution: contact.restitution,
                points,
                point_count,
            });
        }

        let broken = solver::solve(&params, &step, &mut bodies, &mut joints, &mut contacts);
        for (joint, error) in broken {
            log::debug!("joint {:?} broke with error {}", joint, error);
            self.events.push(Event::JointBroke { joint, error });
        }

        // impulses are kept in the manifolds for warm starting the next step
        for solved in &contacts {
            let Some(contact) = self.contacts.contacts.get_mut(solved.key.0) else {
                continue;
            };
            for (manifold_point, point) in contact.manifold.points_mut().zip(solved.points()) {
                manifold_point.normal_impulse = point.normal_impulse;
                manifold_point.tangent_impulse = point.tangent_impulse;
            }
        }
        for (idx, body) in self.entities.bodies.iter_mut() {
            if body.body_type == BodyType::Dynamic && body.awake && !body.disposed {
                body.velocity = bodies[idx.slot() as usize].velocity;
            }
        }
    }

    /// Wake sleeping bodies jointed to awake ones, following chains of joints.
    fn wake_jointed_bodies(&mut self) {
        let sleep = self.params.sleep;
        let is_active = |body: &Body| match body.body_type {
            BodyType::Dynamic => body.awake,
            BodyType::Kinematic => !sleep.is_resting(body),
            BodyType::Static => false,
        };
        loop {
            let mut to_wake = Vec::new();
            for (_, joint) in self.joints.iter() {
                let (a, Some(b)) = joint.bodies() else {
                    continue;
                };
                if !joint.is_enabled() {
                    continue;
                }
                let (Some(body_a), Some(body_b)) =
                    (self.entities.get_body(a), self.entities.get_body(b))
                else {
                    continue;
                };
                let asleep = |body: &Body| {
                    body.body_type == BodyType::Dynamic && !body.awake && !body.disposed
                };
                if is_active(body_a) && asleep(body_b) {
                    to_wake.push(b);
                } else if is_active(body_b) && asleep(body_a) {
                    to_wake.push(a);
                }
            }
            if to_wake.is_empty() {
                break;
            }
            self.wake_all(to_wake);
        }
    }

    fn integrate_positions(&mut self, dt: f64) {
        let _span = tracy_span!("integrate positions", "integrate_positions");
        for (_, body) in self.entities.bodies.iter_mut() {
            let moves = match body.body_type {
                BodyType::Dynamic => body.awake,
                BodyType::Kinematic => true,
                BodyType::Static => false,
            };
            if !moves || body.disposed {
                continue;
            }

            let translation = dt * body.velocity.linear;
            if translation.mag_sq() > MAX_TRANSLATION * MAX_TRANSLATION {
                body.velocity.linear *= MAX_TRANSLATION / translation.mag();
            }
            let rotation = dt * body.velocity.angular;
            if rotation.abs() > MAX_ROTATION {
                body.velocity.angular *= MAX_ROTATION / rotation.abs();
            }

            body.centroid += dt * body.velocity.linear;
            body.angle += dt * body.velocity.angular;
            body.sync_origin();
        }
    }

    fn sweep_disposed(&mut self) {
        for (key, fixture) in self.entities.sweep_disposed() {
            // fixtures disposed during this step still have their proxies
            if fixture.proxies.is_empty() {
                continue;
            }
            for proxy in fixture.proxies {
                self.broad_phase.destroy_proxy(proxy);
            }
            self.contacts.destroy_fixture_contacts(key, &mut self.events);
        }
    }

    fn wake_all(&mut self, keys: impl IntoIterator<Item = BodyKey>) {
        for key in keys {
            if let Some(body) = self.entities.get_body_mut(key) {
                if !body.disposed {
                    body.wake_up();
                }
            }
        }
    }

    //
    // adding and removing things
    //

    pub fn add_body(&mut self, body: impl Into<Body>) -> BodyKey {
        self.entities.insert_body(body.into())
    }

    /// Remove a body along with its fixtures, contacts and joints.
    ///
    /// Returns `false` if the body didn't exist or was already removed.
    pub fn remove_body(&mut self, key: BodyKey) -> bool {
        let removed = self.entities.dispose_body(key);
        if !removed {
            log::warn!("tried to remove body {:?} which doesn't exist", key);
        }
        removed
    }

    /// Attach a fixture to a body, updating the body's mass.
    pub fn add_fixture(
        &mut self,
        body: BodyKey,
        fixture: impl Into<FixtureBuilder>,
    ) -> Result<FixtureKey, PhysicsError> {
        let key = self.entities.attach_fixture(body, fixture.into())?;
        self.wake_all([body]);
        Ok(key)
    }

    pub fn remove_fixture(&mut self, key: FixtureKey) -> bool {
        let body = self.entities.get_fixture(key).map(|f| f.body);
        let removed = self.entities.dispose_fixture(key);
        if removed {
            self.wake_all(body);
        } else {
            log::warn!("tried to remove fixture {:?} which doesn't exist", key);
        }
        removed
    }

    /// Add a joint to the world. Both bodies must exist and be different from each other.
    pub fn add_joint(&mut self, joint: Joint) -> Result<JointKey, PhysicsError> {
        let (a, b) = joint.bodies();
        self.check_body(a)?;
        if let Some(b) = b {
            if b == a {
                return Err(PhysicsError::SelfJoint);
            }
            self.check_body(b)?;
        }
        self.wake_all(std::iter::once(a).chain(b));
        Ok(self.joints.insert(joint))
    }

    pub fn remove_joint(&mut self, key: JointKey) -> Option<Joint> {
        let Some(joint) = self.joints.remove(key) else {
            log::warn!("tried to remove joint {:?} which doesn't exist", key);
            return None;
        };
        let (a, b) = joint.bodies();
        self.wake_all(std::iter::once(a).chain(b));
        Some(joint)
    }

    fn check_body(&self, key: BodyKey) -> Result<(), PhysicsError> {
        match self.entities.get_body(key) {
            None => Err(PhysicsError::NoSuchBody),
            Some(body) if body.disposed => Err(PhysicsError::BodyDisposed),
            Some(_) => Ok(()),
        }
    }

    pub fn add_controller(&mut self, controller: impl Controller + 'static) -> ControllerKey {
        ControllerKey(self.controllers.insert(Box::new(controller)))
    }

    /// Remove a controller, letting it report anything it was tracking.
    pub fn remove_controller(&mut self, key: ControllerKey) -> Option<Box<dyn Controller>> {
        let Some(mut controller) = self.controllers.remove(key.0) else {
            log::warn!("tried to remove controller {:?} which doesn't exist", key);
            return None;
        };
        controller.detach(&mut self.events);
        Some(controller)
    }

    /// Decide which fixtures may collide on top of collision filters and joints.
    pub fn set_contact_filter(&mut self, filter: impl ContactFilter + 'static) {
        self.contact_filter = Some(Box::new(filter));
    }

    pub fn clear_contact_filter(&mut self) {
        self.contact_filter = None;
    }

    /// Replace the broad phase algorithm. Only possible while the world has no fixtures.
    pub fn set_broad_phase(
        &mut self,
        broad_phase: impl BroadPhase + 'static,
    ) -> Result<(), PhysicsError> {
        if self.entities.fixture_count() > 0 || self.broad_phase.proxy_count() > 0 {
            return Err(PhysicsError::BroadPhaseInUse);
        }
        self.broad_phase = Box::new(broad_phase);
        log::debug!("replaced the broad phase");
        Ok(())
    }

    /// Remove every body, fixture, joint and contact, and drop pending events.
    ///
    /// Controllers and the contact filter stay in place.
    pub fn clear(&mut self) {
        for (_, fixture) in self.entities.fixtures.iter_mut() {
            for proxy in fixture.proxies.drain(..) {
                self.broad_phase.destroy_proxy(proxy);
            }
        }
        // flush the pairs of the destroyed proxies
        self.broad_phase.update_pairs();

        let mut scratch = Vec::new();
        for (_, controller) in self.controllers.iter_mut() {
            controller.detach(&mut scratch);
        }
        self.entities.clear();
        self.joints.clear();
        self.contacts.clear();
        self.events.clear();
    }

    //
    // access
    //

    pub fn entities(&self) -> &EntitySet {
        &self.entities
    }

    pub fn get_body(&self, key: BodyKey) -> Option<&Body> {
        self.entities.get_body(key)
    }

    pub fn get_body_mut(&mut self, key: BodyKey) -> Option<&mut Body> {
        self.entities.get_body_mut(key)
    }

    pub fn get_fixture(&self, key: FixtureKey) -> Option<&Fixture> {
        self.entities.get_fixture(key)
    }

    pub fn get_fixture_mut(&mut self, key: FixtureKey) -> Option<&mut Fixture> {
        self.entities.get_fixture_mut(key)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyKey, &Body)> {
        self.entities.bodies()
    }

    pub fn joints(&self) -> &JointSet {
        &self.joints
    }

    pub fn joints_mut(&mut self) -> &mut JointSet {
        &mut self.joints
    }

    pub fn contacts(&self) -> &ContactSet {
        &self.contacts
    }

    /// Take the events produced since the last call.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, Event> {
        self.events.drain(..)
    }

    /// Timings and counts of the last step, if diagnostics are enabled.
    pub fn diagnostics(&self) -> Option<&StepDiagnostics> {
        self.params.enable_diagnostics.then_some(&self.diagnostics)
    }

    //
    // queries
    //

    fn live_fixture(&self, key: FixtureKey) -> Option<(&Fixture, &Body)> {
        let fixture = self.entities.get_fixture(key).filter(|f| !f.disposed)?;
        let body = self.entities.get_body(fixture.body)?;
        Some((fixture, body))
    }

    /// Fixtures whose bounding boxes overlap the given box.
    pub fn query_aabb(&self, aabb: &AABB) -> Vec<FixtureKey> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for owner in self.broad_phase.query_aabb(aabb) {
            if seen.contains(&owner.fixture) {
                continue;
            }
            let Some((fixture, body)) = self.live_fixture(owner.fixture) else {
                continue;
            };
            if fixture.shape.aabb(owner.child, &body.pose()).overlaps(aabb) {
                seen.insert(owner.fixture);
                found.push(owner.fixture);
            }
        }
        found
    }

    fn ray_hits(&self, ray: &Ray, filter: &dyn Fn(&Fixture) -> bool) -> Vec<RayHit> {
        let mut hits = Vec::new();
        for (owner, _) in self.broad_phase.ray_cast(ray) {
            let Some((fixture, body)) = self.live_fixture(owner.fixture) else {
                continue;
            };
            if !filter(fixture) {
                continue;
            }
            let child = fixture.shape.child(owner.child);
            if let Some(hit) = query::ray_shape(ray, &body.pose(), child) {
                hits.push(RayHit {
                    fixture: owner.fixture,
                    body: fixture.body,
                    point: ray.point_at_t(hit.t),
                    normal: hit.normal,
                    fraction: hit.t,
                });
            }
        }
        hits
    }

    /// The closest fixture hit by a ray from `p1` to `p2` that passes the filter.
    pub fn ray_cast(
        &self,
        p1: m::Vec2,
        p2: m::Vec2,
        filter: impl Fn(&Fixture) -> bool,
    ) -> Option<RayHit> {
        self.ray_hits(&Ray::between(p1, p2), &filter)
            .into_iter()
            .min_by(|a, b| a.fraction.total_cmp(&b.fraction))
    }

    /// Every fixture hit by a ray from `p1` to `p2`, closest first.
    pub fn ray_cast_all(&self, p1: m::Vec2, p2: m::Vec2) -> Vec<RayHit> {
        let mut hits = self.ray_hits(&Ray::between(p1, p2), &|_| true);
        hits.sort_by(|a, b| a.fraction.total_cmp(&b.fraction));
        hits
    }

    /// A fixture containing the point, if there is one.
    pub fn collide_at(&self, point: m::Vec2) -> Option<FixtureKey> {
        self.broad_phase
            .query_aabb(&AABB::new(point, point))
            .into_iter()
            .find_map(|owner| {
                let (fixture, body) = self.live_fixture(owner.fixture)?;
                query::point_shape_bool(point, &body.pose(), &fixture.shape)
                    .then_some(owner.fixture)
            })
    }
}
