//! Contacts between pairs of fixture children found by the broad phase.
//!
//! A contact lives as long as the broad phase reports its pair overlapping,
//! which is usually longer than the fixtures actually touch.
//! Its manifold is recomputed every step, carrying accumulated impulses
//! over to points with the same [`ContactId`][super::collision::ContactId].
//! Pairs rejected by the filters are retried every step while they overlap,
//! so changing a filter or removing a joint takes effect without waiting for the pair
//! to separate.

use super::{
    body::BodyType,
    collision::{collide, Manifold, ProxyOwner},
    event::Event,
    fixture::MixPolicy,
    joint_set::JointSet,
    BodyKey, EntitySet, Fixture, FixtureKey,
};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::collections::HashMap;
use thunderdome as td;

/// Key type to look up a contact stored in the physics world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContactKey(pub(crate) td::Index);

/// User veto over which fixtures collide, consulted after the built-in checks.
pub trait ContactFilter: Send + Sync {
    fn should_collide(&self, a: &Fixture, b: &Fixture) -> bool;
}

/// A potential contact between one child each of two fixtures.
#[derive(Clone, Debug)]
pub struct Contact {
    pub(crate) fixtures: [FixtureKey; 2],
    pub(crate) children: [usize; 2],
    pub(crate) bodies: [BodyKey; 2],
    pub(crate) manifold: Manifold,
    pub(crate) friction: f64,
    pub(crate) restitution: f64,
    pub(crate) is_sensor: bool,
    pub(crate) touching: bool,
}

impl Contact {
    #[inline]
    pub fn fixtures(&self) -> [FixtureKey; 2] {
        self.fixtures
    }

    /// Indices of the shape children in contact, nonzero only for chains.
    #[inline]
    pub fn children(&self) -> [usize; 2] {
        self.children
    }

    #[inline]
    pub fn bodies(&self) -> [BodyKey; 2] {
        self.bodies
    }

    /// The manifold computed in the last step, with the normal pointing from the first fixture
    /// to the second.
    #[inline]
    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// Mixed friction of the two fixtures.
    #[inline]
    pub fn friction(&self) -> f64 {
        self.friction
    }

    /// Mixed restitution of the two fixtures.
    #[inline]
    pub fn restitution(&self) -> f64 {
        self.restitution
    }

    /// Sensor contacts are detected but not solved.
    #[inline]
    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    /// Whether the manifold has any points.
    #[inline]
    pub fn is_touching(&self) -> bool {
        self.touching
    }

    #[inline]
    pub fn involves_body(&self, body: BodyKey) -> bool {
        self.bodies[0] == body || self.bodies[1] == body
    }

    #[inline]
    pub fn involves_fixture(&self, fixture: FixtureKey) -> bool {
        self.fixtures[0] == fixture || self.fixtures[1] == fixture
    }

    fn event(&self, began: bool) -> Event {
        let (fixtures, bodies) = (self.fixtures, self.bodies);
        if began {
            Event::ContactBegan { fixtures, bodies }
        } else {
            Event::ContactEnded { fixtures, bodies }
        }
    }
}

/// Mixing rules for the material properties of a contact.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MixRules {
    pub friction: MixPolicy,
    pub restitution: MixPolicy,
}

type OwnerId = (u64, usize);

#[inline]
fn owner_id(owner: ProxyOwner) -> OwnerId {
    (owner.fixture.index().to_bits(), owner.child)
}

#[inline]
fn pair_id(a: ProxyOwner, b: ProxyOwner) -> (OwnerId, OwnerId) {
    let (a, b) = (owner_id(a), owner_id(b));
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Check everything that decides whether two fixtures may collide.
pub(crate) fn should_collide(
    entities: &EntitySet,
    joints: &JointSet,
    filter: Option<&dyn ContactFilter>,
    a: FixtureKey,
    b: FixtureKey,
) -> bool {
    let (Some(fa), Some(fb)) = (entities.get_fixture(a), entities.get_fixture(b)) else {
        return false;
    };
    if fa.disposed || fb.disposed || fa.body == fb.body {
        return false;
    }
    let (Some(ba), Some(bb)) = (entities.get_body(fa.body), entities.get_body(fb.body)) else {
        return false;
    };
    if ba.body_type != BodyType::Dynamic && bb.body_type != BodyType::Dynamic {
        return false;
    }
    if !fa.filter.should_collide(&fb.filter) {
        return false;
    }
    if joints.prevents_collision(fa.body, fb.body) {
        return false;
    }
    filter.map_or(true, |f| f.should_collide(fa, fb))
}

/// Manager struct holding contacts inside of a physics world.
#[derive(Clone, Debug, Default)]
pub struct ContactSet {
    pub(crate) contacts: td::Arena<Contact>,
    by_pair: HashMap<(OwnerId, OwnerId), ContactKey>,
    /// Overlapping pairs that the filters rejected, retried every update.
    waiting: HashMap<(OwnerId, OwnerId), [ProxyOwner; 2]>,
}

impl ContactSet {
    #[inline]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, key: ContactKey) -> Option<&Contact> {
        self.contacts.get(key.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContactKey, &Contact)> {
        self.contacts.iter().map(|(idx, c)| (ContactKey(idx), c))
    }

    /// Contacts with the given body on either side.
    pub fn of_body(&self, body: BodyKey) -> impl Iterator<Item = (ContactKey, &Contact)> {
        self.iter().filter(move |(_, c)| c.involves_body(body))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Create a contact for a newly overlapping proxy pair if the fixtures may collide.
    pub(crate) fn begin(
        &mut self,
        a: ProxyOwner,
        b: ProxyOwner,
        entities: &EntitySet,
        joints: &JointSet,
        filter: Option<&dyn ContactFilter>,
        mix: MixRules,
    ) -> Option<ContactKey> {
        let id = pair_id(a, b);
        if self.by_pair.contains_key(&id) {
            return None;
        }
        if !should_collide(entities, joints, filter, a.fixture, b.fixture) {
            log::trace!("rejected contact between {:?} and {:?}", a.fixture, b.fixture);
            self.wait(a, b, entities);
            return None;
        }
        let (fa, fb) = (entities.get_fixture(a.fixture)?, entities.get_fixture(b.fixture)?);

        let contact = Contact {
            fixtures: [a.fixture, b.fixture],
            children: [a.child, b.child],
            bodies: [fa.body, fb.body],
            manifold: Manifold::empty(),
            friction: mix.friction.mix(fa.material.friction, fb.material.friction),
            restitution: mix
                .restitution
                .mix(fa.material.restitution, fb.material.restitution),
            is_sensor: fa.is_sensor || fb.is_sensor,
            touching: false,
        };
        let key = ContactKey(self.contacts.insert(contact));
        self.by_pair.insert(id, key);
        log::trace!("created contact {:?}", key);
        Some(key)
    }

    /// Keep a rejected pair around in case the filters change while it still overlaps.
    fn wait(&mut self, a: ProxyOwner, b: ProxyOwner, entities: &EntitySet) {
        let alive = |f: FixtureKey| entities.get_fixture(f).map_or(false, |f| !f.disposed);
        if alive(a.fixture) && alive(b.fixture) {
            self.waiting.insert(pair_id(a, b), [a, b]);
        }
    }

    /// Destroy the contact of a proxy pair that stopped overlapping.
    pub(crate) fn end(&mut self, a: ProxyOwner, b: ProxyOwner, events: &mut Vec<Event>) {
        let id = pair_id(a, b);
        self.waiting.remove(&id);
        if let Some(key) = self.by_pair.get(&id).copied() {
            self.destroy(key, events);
        }
    }

    fn destroy(&mut self, key: ContactKey, events: &mut Vec<Event>) {
        let Some(contact) = self.contacts.remove(key.0) else {
            return;
        };
        let owners = [0, 1].map(|i| ProxyOwner {
            fixture: contact.fixtures[i],
            child: contact.children[i],
        });
        self.by_pair.remove(&pair_id(owners[0], owners[1]));
        if contact.touching {
            events.push(contact.event(false));
        }
        log::trace!("destroyed contact {:?}", key);
    }

    /// Destroy every contact involving a fixture.
    pub(crate) fn destroy_fixture_contacts(&mut self, fixture: FixtureKey, events: &mut Vec<Event>) {
        let keys: Vec<ContactKey> = self
            .iter()
            .filter(|(_, c)| c.involves_fixture(fixture))
            .map(|(k, _)| k)
            .collect();
        for key in keys {
            self.destroy(key, events);
        }
        self.waiting
            .retain(|_, [a, b]| a.fixture != fixture && b.fixture != fixture);
    }

    /// Recompute the manifolds of all contacts with at least one awake, moving body.
    ///
    /// Contacts whose fixtures are gone or no longer pass the filters are destroyed.
    /// Returns the contacts that started touching this step.
    pub(crate) fn update(
        &mut self,
        entities: &EntitySet,
        joints: &JointSet,
        filter: Option<&dyn ContactFilter>,
        mix: MixRules,
        events: &mut Vec<Event>,
    ) -> Vec<ContactKey> {
        let _span = tracy_span!("update contacts", "update");

        let retry: Vec<[ProxyOwner; 2]> = self.waiting.values().copied().collect();
        for [a, b] in retry {
            if should_collide(entities, joints, filter, a.fixture, b.fixture) {
                self.waiting.remove(&pair_id(a, b));
                self.begin(a, b, entities, joints, filter, mix);
            }
        }

        let mut rejected = Vec::new();
        let mut active = Vec::new();
        for (idx, contact) in self.contacts.iter() {
            let [fa, fb] = contact.fixtures;
            if !should_collide(entities, joints, filter, fa, fb) {
                rejected.push(ContactKey(idx));
                continue;
            }
            let is_active = contact.bodies.iter().any(|&b| {
                entities
                    .get_body(b)
                    .map_or(false, |b| b.awake && b.body_type != BodyType::Static)
            });
            if is_active {
                active.push(ContactKey(idx));
            }
        }
        for key in rejected {
            if let Some(contact) = self.contacts.get(key.0) {
                let [a, b] = [0, 1].map(|i| ProxyOwner {
                    fixture: contact.fixtures[i],
                    child: contact.children[i],
                });
                self.destroy(key, events);
                self.wait(a, b, entities);
            }
        }

        let compute = |key: &ContactKey| -> Option<Manifold> {
            let contact = self.contacts.get(key.0)?;
            let [fa, fb] = contact.fixtures.map(|f| entities.get_fixture(f));
            let (fa, fb) = (fa?, fb?);
            let [ba, bb] = contact.bodies.map(|b| entities.get_body(b));
            let (ba, bb) = (ba?, bb?);
            Some(collide(
                fa.shape.child(contact.children[0]),
                &ba.pose(),
                fb.shape.child(contact.children[1]),
                &bb.pose(),
            ))
        };
        // each manifold is independent of the others,
        // and results are written back in arena order either way
        #[cfg(feature = "parallel")]
        let manifolds: Vec<Option<Manifold>> = active.par_iter().map(compute).collect();
        #[cfg(not(feature = "parallel"))]
        let manifolds: Vec<Option<Manifold>> = active.iter().map(compute).collect();

        let mut began = Vec::new();
        for (key, manifold) in active.into_iter().zip(manifolds) {
            let Some(mut manifold) = manifold else {
                continue;
            };
            let Some(contact) = self.contacts.get_mut(key.0) else {
                continue;
            };
            let [fa, fb] = contact.fixtures.map(|f| entities.get_fixture(f));
            if let (Some(fa), Some(fb)) = (fa, fb) {
                contact.friction = mix.friction.mix(fa.material.friction, fb.material.friction);
                contact.restitution = mix
                    .restitution
                    .mix(fa.material.restitution, fb.material.restitution);
            }

            if contact.is_sensor {
                // sensors never accumulate impulses
                for p in manifold.points_mut() {
                    p.normal_impulse = 0.0;
                    p.tangent_impulse = 0.0;
                }
            } else {
                manifold.warm_start_from(&contact.manifold);
            }
            contact.manifold = manifold;

            let touching = !contact.manifold.is_empty();
            if touching != contact.touching {
                contact.touching = touching;
                events.push(contact.event(touching));
                if touching {
                    began.push(key);
                }
            }
        }
        began
    }

    pub(crate) fn clear(&mut self) {
        self.contacts.clear();
        self.by_pair.clear();
        self.waiting.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        math as m,
        physics::{collision::Shape, Body, CollisionFilter, FixtureBuilder},
    };

    const MIX: MixRules = MixRules {
        friction: MixPolicy::Average,
        restitution: MixPolicy::Maximum,
    };

    fn owner(fixture: FixtureKey) -> ProxyOwner {
        ProxyOwner { fixture, child: 0 }
    }

    /// Two unit circles with their centers `distance` apart along x.
    fn circles(
        distance: f64,
        second_type: BodyType,
    ) -> (EntitySet, [FixtureKey; 2], [BodyKey; 2]) {
        let mut entities = EntitySet::new();
        let a = entities.insert_body(Body::new_dynamic().build());
        let second = match second_type {
            BodyType::Dynamic => Body::new_dynamic(),
            BodyType::Kinematic => Body::new_kinematic(),
            BodyType::Static => Body::new_static(),
        };
        let b = entities.insert_body(second.with_position([distance, 0.0]).build());
        let circle = || {
            FixtureBuilder::new(Shape::circle(1.0).unwrap())
                .with_friction(0.4)
                .with_restitution(0.5)
        };
        let fa = entities.attach_fixture(a, circle()).unwrap();
        let fb = entities.attach_fixture(b, circle()).unwrap();
        (entities, [fa, fb], [a, b])
    }

    #[test]
    fn pairs_create_one_contact() {
        let (entities, [fa, fb], _) = circles(1.5, BodyType::Dynamic);
        let joints = JointSet::new();
        let mut contacts = ContactSet::new();

        let key = contacts.begin(owner(fa), owner(fb), &entities, &joints, None, MIX);
        assert!(key.is_some());
        // the same pair in either order is a duplicate
        assert!(contacts
            .begin(owner(fb), owner(fa), &entities, &joints, None, MIX)
            .is_none());
        assert_eq!(contacts.len(), 1);

        let mut events = Vec::new();
        contacts.end(owner(fb), owner(fa), &mut events);
        assert!(contacts.is_empty());
        // never touched, so nothing ended
        assert!(events.is_empty());
    }

    #[test]
    fn filters_reject_pairs() {
        struct UntaggedOnly;
        impl ContactFilter for UntaggedOnly {
            fn should_collide(&self, a: &Fixture, b: &Fixture) -> bool {
                a.user_data == 0 && b.user_data == 0
            }
        }

        let joints = JointSet::new();
        let mut contacts = ContactSet::new();

        let (entities, [fa, fb], _) = circles(1.5, BodyType::Static);
        assert!(should_collide(&entities, &joints, None, fa, fb));
        let (entities, [fa, fb], _) = circles(1.5, BodyType::Kinematic);
        assert!(should_collide(&entities, &joints, None, fa, fb));

        let (mut entities, [fa, fb], [a, b]) = circles(1.5, BodyType::Dynamic);
        entities.get_fixture_mut(fb).unwrap().user_data = 7;
        assert!(!should_collide(&entities, &joints, Some(&UntaggedOnly), fa, fb));
        assert!(contacts
            .begin(owner(fa), owner(fb), &entities, &joints, Some(&UntaggedOnly), MIX)
            .is_none());

        let mut joints = JointSet::new();
        joints.insert(crate::physics::JointBuilder::new(a).with_target(b).build_weld());
        assert!(!should_collide(&entities, &joints, None, fa, fb));
    }

    #[test]
    fn touching_changes_produce_events() {
        let (mut entities, [fa, fb], [a, b]) = circles(1.5, BodyType::Dynamic);
        let joints = JointSet::new();
        let mut contacts = ContactSet::new();
        let key = contacts
            .begin(owner(fa), owner(fb), &entities, &joints, None, MIX)
            .unwrap();
        let mut events = Vec::new();

        let began = contacts.update(&entities, &joints, None, MIX, &mut events);
        assert_eq!(began, vec![key]);
        assert_eq!(
            events,
            vec![Event::ContactBegan {
                fixtures: [fa, fb],
                bodies: [a, b]
            }]
        );
        let contact = contacts.get(key).unwrap();
        assert!(contact.is_touching());
        assert_eq!(contact.manifold().point_count(), 1);
        assert!((contact.friction() - 0.4).abs() < 1e-12);
        assert!((contact.restitution() - 0.5).abs() < 1e-12);
        let normal = *contact.manifold().normal;
        assert!((normal - m::Vec2::unit_x()).mag() < 1e-9);

        // separate the circles while the broad phase still reports the pair
        events.clear();
        entities
            .get_body_mut(b)
            .unwrap()
            .set_pose(m::Vec2::new(2.5, 0.0), 0.0);
        contacts.update(&entities, &joints, None, MIX, &mut events);
        assert!(!contacts.get(key).unwrap().is_touching());
        assert_eq!(
            events,
            vec![Event::ContactEnded {
                fixtures: [fa, fb],
                bodies: [a, b]
            }]
        );
    }

    #[test]
    fn removed_fixture_ends_touching_contact() {
        let (mut entities, [fa, fb], _) = circles(1.5, BodyType::Dynamic);
        let joints = JointSet::new();
        let mut contacts = ContactSet::new();
        contacts.begin(owner(fa), owner(fb), &entities, &joints, None, MIX);
        let mut events = Vec::new();
        contacts.update(&entities, &joints, None, MIX, &mut events);
        events.clear();

        entities.dispose_fixture(fb);
        contacts.update(&entities, &joints, None, MIX, &mut events);
        assert!(contacts.is_empty());
        assert!(matches!(events[..], [Event::ContactEnded { .. }]));
    }

    #[test]
    fn rejected_pairs_are_retried_while_overlapping() {
        let (mut entities, [fa, fb], _) = circles(1.5, BodyType::Dynamic);
        let joints = JointSet::new();
        let mut contacts = ContactSet::new();
        let apart = CollisionFilter {
            group: -1,
            ..Default::default()
        };
        for f in [fa, fb] {
            entities.get_fixture_mut(f).unwrap().set_filter(apart);
        }
        assert!(contacts
            .begin(owner(fa), owner(fb), &entities, &joints, None, MIX)
            .is_none());
        let mut events = Vec::new();
        contacts.update(&entities, &joints, None, MIX, &mut events);
        assert!(contacts.is_empty());

        entities
            .get_fixture_mut(fb)
            .unwrap()
            .set_filter(CollisionFilter::default());
        let began = contacts.update(&entities, &joints, None, MIX, &mut events);
        assert_eq!(began.len(), 1);
        assert_eq!(contacts.len(), 1);

        // a pair that stopped overlapping is forgotten
        entities.get_fixture_mut(fb).unwrap().set_filter(apart);
        contacts.update(&entities, &joints, None, MIX, &mut events);
        assert!(contacts.is_empty());
        contacts.end(owner(fa), owner(fb), &mut events);
        entities
            .get_fixture_mut(fb)
            .unwrap()
            .set_filter(CollisionFilter::default());
        contacts.update(&entities, &joints, None, MIX, &mut events);
        assert!(contacts.is_empty());
    }
}
