use super::JointTuning;
use crate::physics::solver::{ConstraintRow, Jacobian, SolverBody, SolverStep};

/// Couples the rotations of two bodies so that
/// `angle_a + ratio * angle_b` stays constant.
#[derive(Clone, Debug)]
pub struct GearJoint {
    pub ratio: f64,
    /// Taken from the bodies when the joint enters the world if not set.
    pub constant: Option<f64>,
    row: ConstraintRow,
}

impl GearJoint {
    pub(crate) fn new(ratio: f64) -> Self {
        Self {
            ratio,
            constant: None,
            row: ConstraintRow::default(),
        }
    }

    fn coordinate(&self, bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
        bodies[pair[0]].angle + self.ratio * bodies[pair[1]].angle
    }

    pub(crate) fn initialize(&mut self, bodies: &[SolverBody], pair: [usize; 2]) {
        if self.constant.is_none() {
            self.constant = Some(self.coordinate(bodies, pair));
        }
    }

    fn position_error(&self, bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
        self.coordinate(bodies, pair) - self.constant.unwrap_or(0.0)
    }

    pub(crate) fn error(&self, bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
        self.position_error(bodies, pair).abs()
    }

    pub(crate) fn pre_step(
        &mut self,
        tuning: &JointTuning,
        step: &SolverStep,
        bodies: &mut [SolverBody],
        pair: [usize; 2],
    ) {
        let c = self.position_error(bodies, pair);
        self.row.prepare(
            Jacobian::angular(1.0, self.ratio),
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
    use crate::{
        math as m,
        physics::{
            joint::{
                tests::{body_at, simulate},
                JointBuilder,
            },
            BodyKey,
        },
    };

    #[test]
    fn gears_turn_in_proportion() {
        let mut arena = thunderdome::Arena::new();
        let (a, b) = (BodyKey(arena.insert(())), BodyKey(arena.insert(())));
        let mut joint = JointBuilder::new(a).with_target(b).build_gear(2.0);
        let mut bodies = [
            body_at(m::Vec2::zero(), 0.5),
            body_at(m::Vec2::new(3.0, 0.0), 0.0),
        ];
        bodies[0].velocity.angular = 3.0;
        simulate(&mut joint, &mut bodies, 60);

        // angle_a + 2 angle_b stays at its initial value of 0.5
        let coordinate = bodies[0].angle + 2.0 * bodies[1].angle;
        assert!((coordinate - 0.5).abs() < 0.01);
        let [wa, wb] = [bodies[0].velocity.angular, bodies[1].velocity.angular];
        assert!((wa + 2.0 * wb).abs() < 1e-6);
        assert!(wa.abs() > 0.1);
    }
}
