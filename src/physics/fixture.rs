use super::{
    collision::{MassData, ProxyKey, Shape},
    BodyKey,
};
use crate::error::PhysicsError;

/// How the friction or restitution coefficients of two fixtures combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum MixPolicy {
    Average,
    Minimum,
    Maximum,
    GeometricMean,
}

impl MixPolicy {
    #[inline]
    pub fn mix(&self, a: f64, b: f64) -> f64 {
        match self {
            MixPolicy::Average => 0.5 * (a + b),
            MixPolicy::Minimum => a.min(b),
            MixPolicy::Maximum => a.max(b),
            MixPolicy::GeometricMean => (a * b).sqrt(),
        }
    }
}

/// Which fixtures are allowed to collide with each other.
///
/// Two fixtures in the same nonzero `group` always collide if the group is positive
/// and never collide if it's negative. Otherwise each fixture's `mask`
/// must contain the other's `category` bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct CollisionFilter {
    pub category: u16,
    pub mask: u16,
    pub group: i16,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            category: 0x0001,
            mask: 0xFFFF,
            group: 0,
        }
    }
}

impl CollisionFilter {
    pub fn should_collide(&self, other: &CollisionFilter) -> bool {
        if self.group != 0 && self.group == other.group {
            return self.group > 0;
        }
        (self.mask & other.category) != 0 && (other.mask & self.category) != 0
    }
}

/// Surface and bulk properties of a fixture.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct Material {
    pub density: f64,
    pub friction: f64,
    pub restitution: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            density: 1.0,
            friction: 0.2,
            restitution: 0.0,
        }
    }
}

/// Binds a shape to a body.
#[derive(Clone, Debug)]
pub struct Fixture {
    pub(crate) shape: Shape,
    pub(crate) material: Material,
    pub(crate) filter: CollisionFilter,
    pub(crate) is_sensor: bool,
    pub(crate) body: BodyKey,
    /// One proxy per shape child, empty until the fixture enters the broad phase.
    pub(crate) proxies: Vec<ProxyKey>,
    pub(crate) disposed: bool,
    /// Free for the user to identify the fixture by.
    pub user_data: u64,
}

impl Fixture {
    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn material(&self) -> Material {
        self.material
    }

    #[inline]
    pub fn filter(&self) -> CollisionFilter {
        self.filter
    }

    /// Change the filter. Existing contacts are re-checked at the next step.
    #[inline]
    pub fn set_filter(&mut self, filter: CollisionFilter) {
        self.filter = filter;
    }

    #[inline]
    pub fn set_friction(&mut self, friction: f64) {
        self.material.friction = friction;
    }

    #[inline]
    pub fn set_restitution(&mut self, restitution: f64) {
        self.material.restitution = restitution;
    }

    /// Sensors detect overlaps but don't produce collision responses.
    #[inline]
    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    #[inline]
    pub fn body(&self) -> BodyKey {
        self.body
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    #[inline]
    pub fn mass_data(&self) -> MassData {
        self.shape.mass_data(self.material.density)
    }
}

/// A builder to create [`Fixture`][self::Fixture]s.
#[derive(Clone, Debug)]
pub struct FixtureBuilder {
    pub shape: Shape,
    pub material: Material,
    pub filter: CollisionFilter,
    pub is_sensor: bool,
    pub user_data: u64,
}

impl FixtureBuilder {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            material: Material::default(),
            filter: CollisionFilter::default(),
            is_sensor: false,
            user_data: 0,
        }
    }

    #[inline]
    pub fn with_density(mut self, density: f64) -> Self {
        self.material.density = density;
        self
    }

    #[inline]
    pub fn with_friction(mut self, friction: f64) -> Self {
        self.material.friction = friction;
        self
    }

    #[inline]
    pub fn with_restitution(mut self, restitution: f64) -> Self {
        self.material.restitution = restitution;
        self
    }

    #[inline]
    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    #[inline]
    pub fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }

    #[inline]
    pub fn with_sensor(mut self, is_sensor: bool) -> Self {
        self.is_sensor = is_sensor;
        self
    }

    #[inline]
    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }

    pub(crate) fn build(self, body: BodyKey) -> Result<Fixture, PhysicsError> {
        let density = self.material.density;
        if !(density > 0.0 && density.is_finite()) {
            return Err(PhysicsError::NonPositive {
                what: "density",
                value: density,
            });
        }
        Ok(Fixture {
            shape: self.shape,
            material: self.material,
            filter: self.filter,
            is_sensor: self.is_sensor,
            body,
            proxies: Vec::new(),
            disposed: false,
            user_data: self.user_data,
        })
    }
}

impl From<Shape> for FixtureBuilder {
    fn from(shape: Shape) -> Self {
        Self::new(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_groups_override_masks() {
        let a = CollisionFilter {
            category: 0b01,
            mask: 0b10,
            group: 0,
        };
        let b = CollisionFilter {
            category: 0b10,
            mask: 0b01,
            group: 0,
        };
        let c = CollisionFilter {
            category: 0b10,
            mask: 0b10,
            group: 0,
        };
        assert!(a.should_collide(&b));
        assert!(!a.should_collide(&c));

        let same_negative = CollisionFilter {
            group: -1,
            ..Default::default()
        };
        assert!(!same_negative.should_collide(&same_negative));
        let same_positive = CollisionFilter {
            group: 2,
            mask: 0,
            ..Default::default()
        };
        assert!(same_positive.should_collide(&same_positive));
    }

    #[test]
    fn mix_policies() {
        assert!((MixPolicy::Average.mix(0.2, 0.4) - 0.3).abs() < 1e-12);
        assert_eq!(MixPolicy::Minimum.mix(0.2, 0.4), 0.2);
        assert_eq!(MixPolicy::Maximum.mix(0.2, 0.4), 0.4);
        assert!((MixPolicy::GeometricMean.mix(0.25, 1.0) - 0.5).abs() < 1e-12);
    }
}
