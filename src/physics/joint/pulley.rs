use super::{world_anchors, JointTuning};
use crate::{
    math as m,
    physics::solver::{ConstraintRow, Jacobian, SolverBody, SolverStep},
};

/// Hangs two bodies from fixed ground points with an ideal rope over a pulley,
/// so that `length_a + ratio * length_b` stays constant.
#[derive(Clone, Debug)]
pub struct PulleyJoint {
    pub local_anchors: [m::Vec2; 2],
    /// World points the rope segments hang from.
    pub ground_anchors: [m::Vec2; 2],
    pub ratio: f64,
    /// Taken from the bodies when the joint enters the world if not set.
    pub total_length: Option<f64>,
    row: ConstraintRow,
}

struct Segments {
    r: [m::Vec2; 2],
    dirs: [m::Vec2; 2],
    lengths: [f64; 2],
}

impl PulleyJoint {
    pub(crate) fn new(local_anchors: [m::Vec2; 2], ground_anchors: [m::Vec2; 2], ratio: f64) -> Self {
        Self {
            local_anchors,
            ground_anchors,
            ratio: if ratio.abs() > m::EPSILON { ratio } else { 1.0 },
            total_length: None,
            row: ConstraintRow::default(),
        }
    }

    fn segments(&self, bodies: &[SolverBody], pair: [usize; 2]) -> Segments {
        let (p, r) = world_anchors(&self.local_anchors, bodies, pair);
        let d = [p[0] - self.ground_anchors[0], p[1] - self.ground_anchors[1]];
        Segments {
            r,
            dirs: [m::normalize_or_zero(d[0]), m::normalize_or_zero(d[1])],
            lengths: [d[0].mag(), d[1].mag()],
        }
    }

    fn length(&self, s: &Segments) -> f64 {
        s.lengths[0] + self.ratio * s.lengths[1]
    }

    pub(crate) fn initialize(&mut self, bodies: &[SolverBody], pair: [usize; 2]) {
        if self.total_length.is_none() {
            let s = self.segments(bodies, pair);
            self.total_length = Some(self.length(&s));
        }
    }

    pub(crate) fn error(&self, bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
        let s = self.segments(bodies, pair);
        (self.length(&s) - self.total_length.unwrap_or(0.0)).abs()
    }

    pub(crate) fn pre_step(
        &mut self,
        tuning: &JointTuning,
        step: &SolverStep,
        bodies: &mut [SolverBody],
        pair: [usize; 2],
    ) {
        let s = self.segments(bodies, pair);
        let c = self.length(&s) - self.total_length.unwrap_or(0.0);
        let jacobian = Jacobian {
            linear: [s.dirs[0], self.ratio * s.dirs[1]],
            angular: [
                m::cross(s.r[0], s.dirs[0]),
                self.ratio * m::cross(s.r[1], s.dirs[1]),
            ],
        };
        self.row.prepare(
            jacobian,
            bodies,
            pair,
            tuning.softness,
            tuning.bias(step.inv_dt, c),
        );
        self.row.warm_start(bodies, pair, step.warm_starting);
    }

    pub(crate) fn solve(&mut self, bodies: &mut [SolverBody], pair: [usize; 2]) {
        self.row.solve(bodies, pair);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{
        joint::{
            tests::{body_at, simulate},
            JointBuilder,
        },
        BodyKey,
    };

    #[test]
    fn one_side_rises_as_the_other_falls() {
        let mut arena = thunderdome::Arena::new();
        let (a, b) = (BodyKey(arena.insert(())), BodyKey(arena.insert(())));
        let mut joint = JointBuilder::new(a)
            .with_target(b)
            .build_pulley([m::Vec2::new(-1.0, 5.0), m::Vec2::new(1.0, 5.0)], 1.0);
        let mut bodies = [
            body_at(m::Vec2::new(-1.0, 2.0), 0.0),
            body_at(m::Vec2::new(1.0, 2.0), 0.0),
        ];
        bodies[0].velocity.linear = m::Vec2::new(0.0, -1.0);
        simulate(&mut joint, &mut bodies, 30);

        let [va, vb] = [bodies[0].velocity.linear, bodies[1].velocity.linear];
        assert!((va.y + vb.y).abs() < 1e-6);
        assert!(va.y < -0.1);
        assert!(bodies[1].position.y > 2.0);
        assert!(joint.error(&bodies, [0, 1]) < 0.01);
    }
}
