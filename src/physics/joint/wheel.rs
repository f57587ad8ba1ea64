use super::{world_anchors, JointTuning};
use crate::{
    math as m,
    physics::solver::{ConstraintRow, Jacobian, SolverBody, SolverStep},
};

use std::f64::consts::TAU;

/// A spring keeping the wheel at the anchor along the suspension axis.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct WheelSpring {
    /// Oscillation frequency in hertz.
    pub frequency: f64,
    /// One for critical damping.
    pub damping_ratio: f64,
}

/// A motor turning the wheel relative to the chassis.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct WheelMotor {
    pub speed: f64,
    pub max_torque: f64,
}

/// Keeps the target's anchor on a line through the owner's anchor,
/// like a wheel on a suspension. The wheel rotates freely unless driven by a motor.
#[derive(Clone, Debug)]
pub struct WheelJoint {
    pub local_anchors: [m::Vec2; 2],
    /// Unit suspension axis in the owner's local coordinates.
    pub local_axis: m::Vec2,
    pub spring: Option<WheelSpring>,
    pub motor: Option<WheelMotor>,
    perpendicular: ConstraintRow,
    spring_row: ConstraintRow,
    motor_row: ConstraintRow,
}

impl WheelJoint {
    pub(crate) fn new(
        local_anchors: [m::Vec2; 2],
        local_axis: m::Vec2,
        spring: Option<WheelSpring>,
        motor: Option<WheelMotor>,
    ) -> Self {
        let local_axis = match m::normalize_or_zero(local_axis) {
            axis if axis == m::Vec2::zero() => m::Vec2::unit_y(),
            axis => axis,
        };
        Self {
            local_anchors,
            local_axis,
            spring,
            motor,
            perpendicular: ConstraintRow::default(),
            spring_row: ConstraintRow::default(),
            motor_row: ConstraintRow::default(),
        }
    }

    /// Anchor arms, anchor separation and world axis.
    fn frame(&self, bodies: &[SolverBody], pair: [usize; 2]) -> ([m::Vec2; 2], m::Vec2, m::Vec2) {
        let (p, r) = world_anchors(&self.local_anchors, bodies, pair);
        let axis = bodies[pair[0]].rotation() * self.local_axis;
        (r, p[1] - p[0], axis)
    }

    pub(crate) fn error(&self, bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
        let (_, d, axis) = self.frame(bodies, pair);
        m::left_normal(axis).dot(d).abs()
    }

    pub(crate) fn pre_step(
        &mut self,
        tuning: &JointTuning,
        step: &SolverStep,
        bodies: &mut [SolverBody],
        pair: [usize; 2],
    ) {
        let (r, d, axis) = self.frame(bodies, pair);
        let arm_a = d + r[0];

        let perp = m::left_normal(axis);
        self.perpendicular.prepare(
            Jacobian::linear(perp, arm_a, r[1]),
            bodies,
            pair,
            tuning.softness,
            tuning.bias(step.inv_dt, perp.dot(d)),
        );
        self.perpendicular
            .warm_start(bodies, pair, step.warm_starting);

        match self.spring {
            Some(spring) if spring.frequency > 0.0 => {
                let jacobian = Jacobian::linear(axis, arm_a, r[1]);
                let k = jacobian.inv_effective_mass(bodies, pair);
                if k > m::EPSILON {
                    let mass = 1.0 / k;
                    let omega = TAU * spring.frequency;
                    let damping = 2.0 * mass * spring.damping_ratio * omega;
                    let stiffness = mass * omega * omega;
                    let gamma_sum = step.dt * (damping + step.dt * stiffness);
                    let gamma = if gamma_sum > m::EPSILON { 1.0 / gamma_sum } else { 0.0 };
                    let bias = axis.dot(d) * step.dt * stiffness * gamma;
                    self.spring_row
                        .prepare(jacobian, bodies, pair, gamma, bias);
                    self.spring_row
                        .warm_start(bodies, pair, step.warm_starting);
                } else {
                    self.spring_row.impulse = 0.0;
                }
            }
            _ => self.spring_row.impulse = 0.0,
        }

        match self.motor {
            Some(motor) => {
                let max_impulse = motor.max_torque.abs() * step.dt;
                self.motor_row.bounds = (-max_impulse, max_impulse);
                self.motor_row.prepare(
                    Jacobian::angular(-1.0, 1.0),
                    bodies,
                    pair,
                    0.0,
                    -motor.speed,
                );
                self.motor_row
                    .warm_start(bodies, pair, step.warm_starting);
            }
            None => self.motor_row.impulse = 0.0,
        }
    }

    pub(crate) fn solve(&mut self, bodies: &mut [SolverBody], pair: [usize; 2]) {
        if matches!(self.spring, Some(s) if s.frequency > 0.0) {
            self.spring_row.solve(bodies, pair);
        }
        if self.motor.is_some() {
            self.motor_row.solve(bodies, pair);
        }
        self.perpendicular.solve(bodies, pair);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{
        joint::{
            tests::{body_at, simulate},
            Joint, JointBuilder,
        },
        BodyKey,
    };

    /// A static chassis at the origin and a wheel on a vertical suspension.
    fn chassis_and_wheel(
        wheel_position: m::Vec2,
        spring: Option<WheelSpring>,
        motor: Option<WheelMotor>,
    ) -> (Joint, [SolverBody; 2]) {
        let mut arena = thunderdome::Arena::new();
        let (a, b) = (BodyKey(arena.insert(())), BodyKey(arena.insert(())));
        let joint = JointBuilder::new(a)
            .with_target(b)
            .build_wheel(m::Vec2::unit_y(), spring, motor);
        let mut chassis = body_at(m::Vec2::zero(), 0.0);
        chassis.inv_mass = 0.0;
        chassis.inv_inertia = 0.0;
        (joint, [chassis, body_at(wheel_position, 0.0)])
    }

    #[test]
    fn motor_turns_wheel_on_its_line() {
        let motor = WheelMotor {
            speed: 4.0,
            max_torque: 100.0,
        };
        let (mut joint, mut bodies) = chassis_and_wheel(m::Vec2::zero(), None, Some(motor));
        bodies[1].velocity.linear = m::Vec2::new(1.0, 0.5);
        simulate(&mut joint, &mut bodies, 30);

        assert!((bodies[1].velocity.angular - 4.0).abs() < 1e-6);
        // free along the axis, held across it
        assert!((bodies[1].velocity.linear.y - 0.5).abs() < 1e-6);
        assert!(bodies[1].position.x.abs() < 0.01);
        assert!(joint.error(&bodies, [0, 1]) < 0.01);
    }

    #[test]
    fn spring_pulls_wheel_back_to_the_anchor() {
        let spring = WheelSpring {
            frequency: 2.0,
            damping_ratio: 1.0,
        };
        let (mut joint, mut bodies) =
            chassis_and_wheel(m::Vec2::new(0.0, 0.5), Some(spring), None);
        simulate(&mut joint, &mut bodies, 180);

        assert!(bodies[1].position.y.abs() < 0.01, "y = {}", bodies[1].position.y);
        assert!(bodies[1].velocity.linear.mag() < 0.05);
    }
}
