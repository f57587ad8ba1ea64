use super::{Body, Fixture, FixtureBuilder};
use crate::error::PhysicsError;

use thunderdome as td;

/// Key type to look up a fixture stored in the physics world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FixtureKey(pub(crate) td::Index);

impl FixtureKey {
    /// Get the underlying [`thunderdome::Index`][thunderdome::Index] of this key.
    /// Useful for creating your own mappings from fixtures to other things.
    #[inline]
    pub fn index(&self) -> td::Index {
        self.0
    }
}

/// Key type to look up a body stored in the physics world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BodyKey(pub(crate) td::Index);

impl BodyKey {
    /// Get the underlying [`thunderdome::Index`][thunderdome::Index] of this key.
    /// Useful for creating your own mappings from bodies to other things.
    #[inline]
    pub fn index(&self) -> td::Index {
        self.0
    }
}

/// Internal representation of objects in the physics world,
/// comprised of bodies and the fixtures attached to them.
#[derive(Default)]
pub struct EntitySet {
    // pub(crate) fields instead of immutable accessors because the solver
    // needs to borrow bodies and fixtures separately
    pub(crate) bodies: td::Arena<Body>,
    // keeping track of highest slot index
    // because slots are used for addressing during physics solve
    pub(crate) body_slot_count: usize,
    pub(crate) fixtures: td::Arena<Fixture>,
}

impl EntitySet {
    #[inline]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Access a [`Body`][super::Body] in the physics world, if it still exists.
    #[inline]
    pub fn get_body(&self, body: BodyKey) -> Option<&Body> {
        self.bodies.get(body.0)
    }

    /// Mutably access a [`Body`][super::Body] in the physics world, if it still exists.
    #[inline]
    pub fn get_body_mut(&mut self, body: BodyKey) -> Option<&mut Body> {
        self.bodies.get_mut(body.0)
    }

    /// Access a [`Fixture`][super::Fixture] in the physics world, if it still exists.
    #[inline]
    pub fn get_fixture(&self, fixture: FixtureKey) -> Option<&Fixture> {
        self.fixtures.get(fixture.0)
    }

    /// Mutably access a [`Fixture`][super::Fixture] in the physics world, if it still exists.
    #[inline]
    pub fn get_fixture_mut(&mut self, fixture: FixtureKey) -> Option<&mut Fixture> {
        self.fixtures.get_mut(fixture.0)
    }

    /// Access the Body a Fixture is attached to, if both still exist.
    #[inline]
    pub fn get_fixture_body(&self, fixture: FixtureKey) -> Option<&Body> {
        self.fixtures
            .get(fixture.0)
            .and_then(|f| self.bodies.get(f.body.0))
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyKey, &Body)> {
        self.bodies.iter().map(|(k, b)| (BodyKey(k), b))
    }

    pub fn fixtures(&self) -> impl Iterator<Item = (FixtureKey, &Fixture)> {
        self.fixtures.iter().map(|(k, f)| (FixtureKey(k), f))
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    pub(crate) fn insert_body(&mut self, body: Body) -> BodyKey {
        let key = self.bodies.insert(body);
        let slot = key.slot() as usize;
        if slot >= self.body_slot_count {
            self.body_slot_count = slot + 1;
        }
        BodyKey(key)
    }

    /// Attach a new fixture to a body and update the body's mass.
    pub(crate) fn attach_fixture(
        &mut self,
        body_key: BodyKey,
        fixture: FixtureBuilder,
    ) -> Result<FixtureKey, PhysicsError> {
        match self.bodies.get(body_key.0) {
            None => return Err(PhysicsError::NoSuchBody),
            Some(b) if b.disposed => return Err(PhysicsError::BodyDisposed),
            Some(_) => {}
        }
        let fixture = fixture.build(body_key)?;
        let key = FixtureKey(self.fixtures.insert(fixture));
        if let Some(body) = self.bodies.get_mut(body_key.0) {
            body.fixtures.push(key);
        }
        self.reset_mass_data(body_key);
        Ok(key)
    }

    pub(crate) fn reset_mass_data(&mut self, body_key: BodyKey) {
        let Some(body) = self.bodies.get_mut(body_key.0) else {
            return;
        };
        let fixtures = &self.fixtures;
        body.reset_mass_data(body.fixtures.clone().iter().filter_map(|f| fixtures.get(f.0)));
    }

    /// Mark a body and all its fixtures as removed.
    /// They stay in storage until [`sweep_disposed`][Self::sweep_disposed] is called.
    pub(crate) fn dispose_body(&mut self, body_key: BodyKey) -> bool {
        let Some(body) = self.bodies.get_mut(body_key.0) else {
            return false;
        };
        if body.disposed {
            return false;
        }
        body.disposed = true;
        for f in &body.fixtures {
            if let Some(fixture) = self.fixtures.get_mut(f.0) {
                fixture.disposed = true;
            }
        }
        true
    }

    pub(crate) fn dispose_fixture(&mut self, fixture_key: FixtureKey) -> bool {
        let Some(fixture) = self.fixtures.get_mut(fixture_key.0) else {
            return false;
        };
        if fixture.disposed {
            return false;
        }
        fixture.disposed = true;
        let body_key = fixture.body;
        self.reset_mass_data(body_key);
        true
    }

    /// Remove disposed bodies and fixtures from storage,
    /// returning the removed fixtures so their proxies can be cleaned up.
    pub(crate) fn sweep_disposed(&mut self) -> Vec<(FixtureKey, Fixture)> {
        let disposed_fixtures: Vec<td::Index> = self
            .fixtures
            .iter()
            .filter(|(_, f)| f.disposed)
            .map(|(k, _)| k)
            .collect();
        let mut removed = Vec::with_capacity(disposed_fixtures.len());
        for key in disposed_fixtures {
            if let Some(fixture) = self.fixtures.remove(key) {
                if let Some(body) = self.bodies.get_mut(fixture.body.0) {
                    body.fixtures.retain(|f| f.0 != key);
                }
                removed.push((FixtureKey(key), fixture));
            }
        }
        self.bodies.retain(|_, b| !b.disposed);
        removed
    }

    // not exposed to users, must use through PhysicsWorld::clear
    pub(crate) fn clear(&mut self) {
        self.bodies.clear();
        self.body_slot_count = 0;
        self.fixtures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::collision::Shape;

    #[test]
    fn fixtures_go_with_their_body() {
        let mut set = EntitySet::new();
        let body = set.insert_body(Body::new_dynamic().build());
        let other = set.insert_body(Body::new_dynamic().build());
        let f1 = set
            .attach_fixture(body, Shape::circle(1.0).unwrap().into())
            .unwrap();
        let f2 = set
            .attach_fixture(body, Shape::rect(1.0, 1.0).unwrap().into())
            .unwrap();
        let f3 = set
            .attach_fixture(other, Shape::circle(1.0).unwrap().into())
            .unwrap();
        assert_eq!(set.get_body(body).unwrap().fixtures(), &[f1, f2]);
        let expected_mass = std::f64::consts::PI + 1.0;
        assert!((set.get_body(body).unwrap().mass().value() - expected_mass).abs() < 1e-12);

        assert!(set.dispose_body(body));
        assert!(!set.dispose_body(body));
        assert!(set.get_fixture(f1).unwrap().is_disposed());
        assert_eq!(
            set.attach_fixture(body, Shape::circle(1.0).unwrap().into()),
            Err(PhysicsError::BodyDisposed)
        );

        let removed: Vec<FixtureKey> = set.sweep_disposed().into_iter().map(|(k, _)| k).collect();
        assert_eq!(removed, vec![f1, f2]);
        assert!(set.get_body(body).is_none());
        assert!(set.get_fixture(f3).is_some());
        assert_eq!(set.body_count(), 1);
    }

    #[test]
    fn disposing_a_fixture_updates_mass() {
        let mut set = EntitySet::new();
        let body = set.insert_body(Body::new_dynamic().build());
        let f1 = set
            .attach_fixture(body, Shape::rect(1.0, 1.0).unwrap().into())
            .unwrap();
        set.attach_fixture(body, Shape::rect(2.0, 1.0).unwrap().into())
            .unwrap();
        assert!((set.get_body(body).unwrap().mass().value() - 3.0).abs() < 1e-12);
        set.dispose_fixture(f1);
        assert!((set.get_body(body).unwrap().mass().value() - 2.0).abs() < 1e-12);
    }
}
