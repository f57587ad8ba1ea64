use super::{joint::Joint, BodyKey};
use crate::math as m;

use thunderdome as td;

/// Key type to look up a joint stored in the physics world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JointKey(pub(crate) td::Index);

/// Manager struct holding joints inside of a physics world.
#[derive(Clone, Debug, Default)]
pub struct JointSet {
    pub(crate) joints: td::Arena<Joint>,
}

impl JointSet {
    #[inline]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Joints enter through the world, which checks that their bodies exist.
    #[inline]
    pub(crate) fn insert(&mut self, joint: Joint) -> JointKey {
        JointKey(self.joints.insert(joint))
    }

    /// Access a joint in the physics world, if it still exists.
    #[inline]
    pub fn get(&self, key: JointKey) -> Option<&Joint> {
        self.joints.get(key.0)
    }

    /// Mutably access a joint in the physics world, if it still exists.
    #[inline]
    pub fn get_mut(&mut self, key: JointKey) -> Option<&mut Joint> {
        self.joints.get_mut(key.0)
    }

    /// Remove a joint from the physics world, returning it if it still existed.
    ///
    /// Joints also disappear on their own when one of their bodies is removed,
    /// so it's not guaranteed the joint will exist
    /// even if it hasn't been explicitly removed before.
    #[inline]
    pub fn remove(&mut self, key: JointKey) -> Option<Joint> {
        self.joints.remove(key.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (JointKey, &Joint)> {
        self.joints.iter().map(|(idx, j)| (JointKey(idx), j))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Detach the joint's second body and pin its second anchor to a point in the world.
    ///
    /// Returns false if the joint doesn't exist.
    pub fn set_world_anchor(&mut self, key: JointKey, point: m::Vec2) -> bool {
        match self.joints.get_mut(key.0) {
            Some(joint) => {
                joint.set_world_anchor(point);
                true
            }
            None => false,
        }
    }

    /// Whether a joint between the two bodies keeps them from colliding.
    pub(crate) fn prevents_collision(&self, a: BodyKey, b: BodyKey) -> bool {
        self.joints
            .iter()
            .any(|(_, j)| !j.collide_connected && j.connects(a, b))
    }

    /// Remove the joints attached to a body, returning their keys.
    pub(crate) fn remove_attached(&mut self, body: BodyKey) -> Vec<JointKey> {
        let keys: Vec<JointKey> = self
            .joints
            .iter()
            .filter(|(_, j)| j.involves(body))
            .map(|(idx, _)| JointKey(idx))
            .collect();
        for key in &keys {
            self.joints.remove(key.0);
        }
        keys
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.joints.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::joint::{DistanceLimit, JointBuilder};

    #[test]
    fn connected_bodies_skip_collision_unless_asked() {
        let mut arena = td::Arena::new();
        let [a, b, c] = [(); 3].map(|_| BodyKey(arena.insert(())));
        let mut joints = JointSet::new();
        joints.insert(JointBuilder::new(a).with_target(b).build_revolute());
        let key = joints.insert(
            JointBuilder::new(b)
                .with_target(c)
                .with_collide_connected(true)
                .build_distance(1.0, DistanceLimit::Exact),
        );

        assert!(joints.prevents_collision(b, a));
        assert!(!joints.prevents_collision(b, c));
        assert!(!joints.prevents_collision(a, c));

        let removed = joints.remove_attached(c);
        assert_eq!(removed, vec![key]);
        assert_eq!(joints.len(), 1);
    }
}
