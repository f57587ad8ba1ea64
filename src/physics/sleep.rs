//! Putting bodies that have come to rest to sleep, and waking them back up.
//!
//! A dynamic body accumulates sleep time while its velocity stays below the thresholds.
//! It falls asleep once its own timer and the timers of every dynamic body it touches
//! or is jointed to have passed `time_to_sleep`, so stacks go to sleep together.
//! Sleeping bodies take no part in the solver and skip integration.

use super::{body::BodyType, Body, BodyKey, ContactSet, EntitySet, JointSet};

use std::collections::{HashMap, HashSet};

/// Parameters controlling when bodies fall asleep.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct SleepParams {
    pub enabled: bool,
    /// Linear speed below which a body counts as resting.
    pub linear_threshold: f64,
    /// Angular speed below which a body counts as resting.
    pub angular_threshold: f64,
    /// Seconds a body must rest before it can fall asleep.
    pub time_to_sleep: f64,
    /// Moving bodies wake sleeping ones whose bounding boxes are within this distance.
    pub activation_distance: f64,
}

impl Default for SleepParams {
    fn default() -> Self {
        Self {
            enabled: true,
            linear_threshold: 0.01,
            angular_threshold: 2.0_f64.to_radians(),
            time_to_sleep: 0.5,
            activation_distance: 0.1,
        }
    }
}

impl SleepParams {
    #[inline]
    pub(crate) fn is_resting(&self, body: &Body) -> bool {
        body.velocity.linear.mag_sq() <= self.linear_threshold * self.linear_threshold
            && body.velocity.angular.abs() <= self.angular_threshold
    }
}

/// Advance sleep timers after a step and put resting groups of bodies to sleep.
///
/// Returns the bodies that fell asleep.
pub(crate) fn update(
    params: &SleepParams,
    dt: f64,
    entities: &mut EntitySet,
    contacts: &ContactSet,
    joints: &JointSet,
) -> Vec<BodyKey> {
    let _span = tracy_span!("sleep", "update");

    if !params.enabled {
        for (_, body) in entities.bodies.iter_mut() {
            body.sleep_time = 0.0;
        }
        return Vec::new();
    }

    for (_, body) in entities.bodies.iter_mut() {
        if body.body_type != BodyType::Dynamic || !body.awake || body.disposed {
            continue;
        }
        if body.allow_sleep && params.is_resting(body) {
            body.sleep_time += dt;
        } else {
            body.sleep_time = 0.0;
        }
    }

    let ready = |key: BodyKey| {
        entities.get_body(key).map_or(true, |b| {
            b.body_type != BodyType::Dynamic || !b.awake || b.sleep_time >= params.time_to_sleep
        })
    };

    // dynamic bodies that are touching or jointed to each other
    let mut neighbors: HashMap<BodyKey, Vec<BodyKey>> = HashMap::new();
    let mut link = |a: BodyKey, b: BodyKey| {
        neighbors.entry(a).or_default().push(b);
        neighbors.entry(b).or_default().push(a);
    };
    for (_, contact) in contacts.iter() {
        if contact.touching && !contact.is_sensor {
            link(contact.bodies[0], contact.bodies[1]);
        }
    }
    for (_, joint) in joints.iter() {
        if let (a, Some(b)) = joint.bodies() {
            if joint.is_enabled() {
                link(a, b);
            }
        }
    }

    // flood fill over groups of awake dynamic bodies; a group sleeps if every member is ready
    let mut visited: HashSet<BodyKey> = HashSet::new();
    let mut to_sleep = Vec::new();
    for (idx, body) in entities.bodies.iter() {
        let key = BodyKey(idx);
        if body.body_type != BodyType::Dynamic || !body.awake || visited.contains(&key) {
            continue;
        }
        let mut group = Vec::new();
        let mut stack = vec![key];
        visited.insert(key);
        let mut all_ready = true;
        while let Some(current) = stack.pop() {
            all_ready &= ready(current);
            group.push(current);
            for &next in neighbors.get(&current).into_iter().flatten() {
                let is_awake_dynamic = entities
                    .get_body(next)
                    .map_or(false, |b| b.body_type == BodyType::Dynamic && b.awake);
                if is_awake_dynamic && visited.insert(next) {
                    stack.push(next);
                }
            }
        }
        if all_ready {
            to_sleep.extend(group);
        }
    }

    for key in &to_sleep {
        if let Some(body) = entities.get_body_mut(*key) {
            body.put_to_sleep();
        }
    }
    if !to_sleep.is_empty() {
        log::trace!("{} bodies fell asleep", to_sleep.len());
    }
    to_sleep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{Body, JointBuilder, Velocity};

    #[test]
    fn jointed_bodies_sleep_together() {
        let params = SleepParams::default();
        let mut entities = EntitySet::new();
        let a = entities.insert_body(Body::new_dynamic().build());
        let b = entities.insert_body(Body::new_dynamic().build());
        let loner = entities.insert_body(Body::new_dynamic().build());
        let mut joints = JointSet::new();
        joints.insert(JointBuilder::new(a).with_target(b).build_revolute());
        let contacts = ContactSet::new();

        entities.get_body_mut(b).unwrap().set_velocity(Velocity {
            linear: crate::math::Vec2::new(1.0, 0.0),
            angular: 0.0,
        });
        let asleep = update(&params, 0.6, &mut entities, &contacts, &joints);
        // `a` is resting but its partner is not
        assert_eq!(asleep, vec![loner]);
        assert!(entities.get_body(a).unwrap().is_awake());

        entities.get_body_mut(b).unwrap().velocity = Velocity::default();
        update(&params, 0.3, &mut entities, &contacts, &joints);
        assert!(entities.get_body(a).unwrap().is_awake());
        let asleep = update(&params, 0.3, &mut entities, &contacts, &joints);
        assert_eq!(asleep.len(), 2);
        assert!(!entities.get_body(b).unwrap().is_awake());
    }
}
