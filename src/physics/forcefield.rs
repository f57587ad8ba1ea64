//! Forces applied to bodies every step before the solver runs.

use super::{
    body::BodyType,
    collision::{Shape, AABB},
    event::Event,
    Body, BodyKey, EntitySet,
};
use crate::math as m;

use std::collections::HashSet;

/// A (possibly) position-dependent acceleration,
/// applied to every dynamic body through a [`FieldController`].
pub trait ForceField: Send + Sync {
    fn value_at(&self, position: m::Vec2) -> m::Vec2;
}

pub struct NoneField;
impl ForceField for NoneField {
    fn value_at(&self, _: m::Vec2) -> m::Vec2 {
        m::Vec2::zero()
    }
}

/// A combination of two different force fields.
pub struct Sum<F1: ForceField, F2: ForceField>(pub F1, pub F2);
impl<F1: ForceField, F2: ForceField> ForceField for Sum<F1, F2> {
    fn value_at(&self, pos: m::Vec2) -> m::Vec2 {
        self.0.value_at(pos) + self.1.value_at(pos)
    }
}

/// Constant gravity field over all of space.
pub struct Gravity(pub m::Vec2);
impl ForceField for Gravity {
    fn value_at(&self, _pos: m::Vec2) -> m::Vec2 {
        self.0
    }
}

/// Gravity that pulls towards a specific point in space.
///
/// With a negative `strength` value this can also be a repulsive force.
pub struct PointGravity {
    /// The position of the gravity source.
    pub position: m::Vec2,
    /// The strength of gravity at the source.
    pub strength: f64,
    /// How quickly gravity falls off with distance.
    pub falloff: f64,
}
impl ForceField for PointGravity {
    fn value_at(&self, pos: m::Vec2) -> m::Vec2 {
        let dist = self.position - pos;
        // + 1.0 so that the divisor is 1 at the source
        let strength = self.strength / ((dist.mag_sq() + 1.0) * self.falloff);
        strength * m::normalize_or_zero(dist)
    }
}

/// Something that applies forces to bodies every step, before velocities are integrated.
pub trait Controller: Send + Sync {
    fn apply(&mut self, entities: &mut EntitySet, dt: f64, events: &mut Vec<Event>);

    /// Called when the controller is removed from the world.
    fn detach(&mut self, _events: &mut Vec<Event>) {}
}

/// Applies a [`ForceField`] to every awake dynamic body, scaled by mass.
pub struct FieldController<F: ForceField>(pub F);

impl<F: ForceField> Controller for FieldController<F> {
    fn apply(&mut self, entities: &mut EntitySet, _dt: f64, _events: &mut Vec<Event>) {
        for (_, body) in entities.bodies.iter_mut() {
            if body.body_type != BodyType::Dynamic || !body.awake || body.disposed {
                continue;
            }
            let centroid = body.world_centroid();
            let force = body.mass.value() * self.0.value_at(centroid);
            body.apply_force_at_point(force, centroid);
        }
    }
}

//
// fluid
//

/// Buoyancy and drag for bodies inside a rectangular body of fluid.
///
/// The fluid fills `region`, with its surface at the top edge.
pub struct FluidDrag {
    pub region: AABB,
    pub density: f64,
    pub linear_drag: f64,
    pub angular_drag: f64,
    /// Gravity the buoyancy force works against.
    pub gravity: m::Vec2,
    inside: HashSet<BodyKey>,
}

impl FluidDrag {
    pub fn new(region: AABB, density: f64, gravity: m::Vec2) -> Self {
        Self {
            region,
            density,
            linear_drag: 2.0,
            angular_drag: 1.0,
            gravity,
            inside: HashSet::new(),
        }
    }

    pub fn with_drag(mut self, linear: f64, angular: f64) -> Self {
        self.linear_drag = linear;
        self.angular_drag = angular;
        self
    }

    /// Bodies currently in the fluid.
    pub fn bodies_inside(&self) -> impl Iterator<Item = BodyKey> + '_ {
        self.inside.iter().copied()
    }

    /// Submerged area of a body and its centroid in world space.
    fn submerged(&self, entities: &EntitySet, body: &Body) -> (f64, m::Vec2) {
        let pose = body.pose();
        let mut area = 0.0;
        let mut weighted = m::Vec2::zero();
        for fixture in body.fixtures.iter().filter_map(|f| entities.get_fixture(*f)) {
            if fixture.disposed || fixture.is_sensor {
                continue;
            }
            let (a, c) = match &fixture.shape {
                Shape::Circle(circle) => {
                    submerged_circle(pose * circle.center, circle.radius, self.region.max.y)
                }
                Shape::Polygon(poly) => {
                    let world: Vec<m::Vec2> = poly.vertices().iter().map(|v| pose * *v).collect();
                    submerged_polygon(&world, self.region.max.y)
                }
                Shape::Edge(_) | Shape::Chain(_) => continue,
            };
            area += a;
            weighted += a * c;
        }
        if area > m::EPSILON {
            (area, weighted / area)
        } else {
            (0.0, pose.translation)
        }
    }
}

impl Controller for FluidDrag {
    fn apply(&mut self, entities: &mut EntitySet, _dt: f64, events: &mut Vec<Event>) {
        let mut now_inside = HashSet::new();
        let mut forces = Vec::new();
        for (idx, body) in entities.bodies.iter() {
            if body.body_type != BodyType::Dynamic || body.disposed {
                continue;
            }
            let Some(aabb) = body_aabb(entities, body) else {
                continue;
            };
            if !aabb.overlaps(&self.region) {
                continue;
            }
            let (area, centroid) = self.submerged(entities, body);
            if area <= 0.0 {
                continue;
            }
            now_inside.insert(BodyKey(idx));
            if !body.awake {
                continue;
            }

            let buoyancy = -self.density * area * self.gravity;
            let drag = -self.linear_drag * self.density * area
                * body.velocity.point_velocity(centroid - body.centroid);
            let torque = -self.angular_drag * self.density * area * body.velocity.angular;
            forces.push((BodyKey(idx), buoyancy + drag, centroid, torque));
        }

        for (key, force, point, torque) in forces {
            if let Some(body) = entities.get_body_mut(key) {
                body.apply_force_at_point(force, point);
                body.apply_torque(torque);
            }
        }

        for &body in now_inside.difference(&self.inside) {
            events.push(Event::FluidEntered { body });
        }
        for &body in self.inside.difference(&now_inside) {
            events.push(Event::FluidLeft { body });
        }
        self.inside = now_inside;
    }

    fn detach(&mut self, events: &mut Vec<Event>) {
        events.extend(self.inside.drain().map(|body| Event::FluidLeft { body }));
    }
}

fn body_aabb(entities: &EntitySet, body: &Body) -> Option<AABB> {
    let pose = body.pose();
    body.fixtures
        .iter()
        .filter_map(|f| entities.get_fixture(*f))
        .flat_map(|f| (0..f.shape.child_count()).map(move |c| f.shape.aabb(c, &pose)))
        .reduce(|a, b| a.union(&b))
}

/// Area and centroid of the part of a circle below a horizontal surface.
fn submerged_circle(center: m::Vec2, radius: f64, surface: f64) -> (f64, m::Vec2) {
    // signed depth of the surface above the center
    let d = surface - center.y;
    if d <= -radius {
        return (0.0, center);
    }
    if d >= radius {
        return (std::f64::consts::PI * radius * radius, center);
    }
    let r2 = radius * radius;
    let h2 = r2 - d * d;
    let area = r2 * (-d / radius).acos() + d * h2.sqrt();
    let offset = -(2.0 / 3.0) * h2.powf(1.5) / area;
    (area, center + m::Vec2::new(0.0, offset))
}

/// Area and centroid of the part of a counter-clockwise polygon below a horizontal surface.
fn submerged_polygon(vertices: &[m::Vec2], surface: f64) -> (f64, m::Vec2) {
    let mut clipped: Vec<m::Vec2> = Vec::with_capacity(vertices.len() + 2);
    for (i, &v1) in vertices.iter().enumerate() {
        let v2 = vertices[(i + 1) % vertices.len()];
        let (in1, in2) = (v1.y <= surface, v2.y <= surface);
        if in1 {
            clipped.push(v1);
        }
        if in1 != in2 {
            let t = (surface - v1.y) / (v2.y - v1.y);
            clipped.push(v1 + t * (v2 - v1));
        }
    }
    if clipped.len() < 3 {
        return (0.0, m::Vec2::zero());
    }

    let origin = clipped[0];
    let mut area = 0.0;
    let mut centroid = m::Vec2::zero();
    for i in 1..clipped.len() - 1 {
        let (e1, e2) = (clipped[i] - origin, clipped[i + 1] - origin);
        let tri_area = 0.5 * m::cross(e1, e2);
        area += tri_area;
        centroid += tri_area * (e1 + e2) / 3.0;
    }
    if area <= m::EPSILON {
        return (0.0, m::Vec2::zero());
    }
    (area, origin + centroid / area)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::FixtureBuilder;

    #[test]
    fn half_submerged_shapes() {
        let (area, centroid) = submerged_circle(m::Vec2::zero(), 1.0, 0.0);
        assert!((area - 0.5 * std::f64::consts::PI).abs() < 1e-9);
        // centroid of a half disc is 4r / 3pi below the cut
        let expected = -4.0 / (3.0 * std::f64::consts::PI);
        assert!((centroid.y - expected).abs() < 1e-9);

        let square = [
            m::Vec2::new(-1.0, -1.0),
            m::Vec2::new(1.0, -1.0),
            m::Vec2::new(1.0, 1.0),
            m::Vec2::new(-1.0, 1.0),
        ];
        let (area, centroid) = submerged_polygon(&square, 0.5);
        assert!((area - 3.0).abs() < 1e-9);
        assert!((centroid - m::Vec2::new(0.0, -0.25)).mag() < 1e-9);
        assert_eq!(submerged_polygon(&square, -2.0).0, 0.0);
    }

    #[test]
    fn field_applies_weight() {
        let mut entities = EntitySet::new();
        let body = entities.insert_body(Body::new_dynamic().with_mass(2.0).build());
        let mut controller = FieldController(Gravity(m::Vec2::new(0.0, -10.0)));
        controller.apply(&mut entities, 1.0 / 60.0, &mut Vec::new());
        assert_eq!(entities.get_body(body).unwrap().force, m::Vec2::new(0.0, -20.0));
    }

    #[test]
    fn fluid_reports_entering_and_leaving() {
        let mut entities = EntitySet::new();
        let body = entities.insert_body(Body::new_dynamic().with_position([0.0, 0.0]).build());
        entities
            .attach_fixture(body, FixtureBuilder::new(Shape::rect(1.0, 1.0).unwrap()))
            .unwrap();
        let region = AABB::new(m::Vec2::new(-5.0, -5.0), m::Vec2::new(5.0, 0.0));
        let mut fluid = FluidDrag::new(region, 2.0, m::Vec2::new(0.0, -10.0));
        let mut events = Vec::new();

        fluid.apply(&mut entities, 1.0 / 60.0, &mut events);
        assert_eq!(events, vec![Event::FluidEntered { body }]);
        // half of the unit box displaces 0.5 units of fluid with density 2
        let force = entities.get_body(body).unwrap().force;
        assert!((force.y - 10.0).abs() < 1e-9);

        events.clear();
        entities
            .get_body_mut(body)
            .unwrap()
            .set_pose(m::Vec2::new(0.0, 3.0), 0.0);
        fluid.apply(&mut entities, 1.0 / 60.0, &mut events);
        assert_eq!(events, vec![Event::FluidLeft { body }]);
        assert_eq!(fluid.bodies_inside().count(), 0);
    }
}
