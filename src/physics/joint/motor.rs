use super::JointTuning;
use crate::physics::solver::{ConstraintRow, Jacobian, SolverBody, SolverStep};

/// Drives the angular velocity of the owning body relative to the target
/// towards a target speed, using at most `max_torque`.
#[derive(Clone, Debug)]
pub struct MotorJoint {
    pub speed: f64,
    pub max_torque: f64,
    row: ConstraintRow,
}

impl MotorJoint {
    pub(crate) fn new(speed: f64, max_torque: f64) -> Self {
        Self {
            speed,
            max_torque: max_torque.abs(),
            row: ConstraintRow::default(),
        }
    }

    /// The angular impulse applied to the owning body during the last step.
    pub fn impulse(&self) -> f64 {
        self.row.impulse
    }

    pub(crate) fn pre_step(
        &mut self,
        _tuning: &JointTuning,
        step: &SolverStep,
        bodies: &mut [SolverBody],
        pair: [usize; 2],
    ) {
        let max_impulse = self.max_torque.abs() * step.dt;
        self.row.bounds = (-max_impulse, max_impulse);
        self.row
            .prepare(Jacobian::angular(1.0, -1.0), bodies, pair, 0.0, -self.speed);
        self.row.warm_start(bodies, pair, step.warm_starting);
    }

    pub(crate) fn solve(&mut self, bodies: &mut [SolverBody], pair: [usize; 2]) {
        self.row.solve(bodies, pair);
    }
}
