//! Simulated impedance controller

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use util::maths::lin_map;

use super::ImpedanceParams;
use crate::{
    collab::{Impedance, Tuning},
    model::{LegId, LegState, Model, NUM_LEGS},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Mass-spring-damper per leg, driven by the tip force (or the summed joint efforts).
#[derive(Debug, Clone)]
pub struct SimImpedance {
    params: ImpedanceParams,
    tuning: Tuning,

    /// Rate of change of each leg's vertical offset.
    ///
    /// Units: meters/second
    delta_z_rate: [f64; NUM_LEGS],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimImpedance {
    pub fn new(params: ImpedanceParams, tuning: Tuning) -> Self {
        Self {
            params,
            tuning,
            delta_z_rate: [0.0; NUM_LEGS],
        }
    }
}

impl Impedance for SimImpedance {
    fn init(&mut self, tuning: &Tuning) {
        self.tuning = *tuning;
        self.delta_z_rate = [0.0; NUM_LEGS];
    }

    fn update_walking_stiffness(&mut self, model: &mut Model) {
        for leg in model.legs_mut() {
            leg.virtual_stiffness = if leg.swinging {
                self.tuning.virtual_stiffness * self.params.swing_stiffness_scaler
            } else {
                self.tuning.virtual_stiffness
            };
        }
    }

    fn update_leg_stiffness(&mut self, leg: LegId, progress: f64, model: &mut Model) {
        // Lifting goes from loaded to unloaded, lowering the other way round
        let unload = match model.leg(leg).state {
            LegState::ManualToWalking => 1.0 - progress,
            _ => progress,
        };

        let k = self.tuning.virtual_stiffness;
        let idx = leg.index();
        let neighbours = [(idx + 1) % NUM_LEGS, (idx + NUM_LEGS - 1) % NUM_LEGS];

        for l in model.legs_mut() {
            let i = l.id.index();
            if i == idx {
                l.virtual_stiffness =
                    k * lin_map((0.0, 1.0), (1.0, self.params.swing_stiffness_scaler), unload);
            } else if neighbours.contains(&i) {
                l.virtual_stiffness =
                    k * lin_map((0.0, 1.0), (1.0, self.params.load_stiffness_scaler), unload);
            }
        }
    }

    fn update_impedance(&mut self, leg: LegId, use_joint_effort: bool, model: &mut Model) {
        let dt = self.params.integrator_step_time_s;
        let leg = model.leg_mut(leg);

        let force = if use_joint_effort {
            leg.joints.iter().map(|j| j.current_effort.abs()).sum::<f64>()
        } else {
            leg.tip_force
        };

        let mass = self.tuning.virtual_mass.max(1e-6);
        let stiffness = leg.virtual_stiffness.max(0.0);
        let damping = 2.0 * self.tuning.virtual_damping * (mass * stiffness).sqrt();

        let rate = &mut self.delta_z_rate[leg.id.index()];
        let accel =
            (self.tuning.force_gain * force - damping * *rate - stiffness * leg.delta_z_m) / mass;
        *rate += accel * dt;
        leg.delta_z_m += *rate * dt;
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::test::leg_params;

    fn impedance() -> SimImpedance {
        SimImpedance::new(
            ImpedanceParams {
                integrator_step_time_s: 0.02,
                load_stiffness_scaler: 5.0,
                swing_stiffness_scaler: 0.1,
            },
            Tuning {
                step_frequency: 1.0,
                step_clearance: 0.05,
                body_clearance: 0.1,
                leg_span_scale: 1.0,
                virtual_mass: 10.0,
                virtual_stiffness: 10.0,
                virtual_damping: 0.8,
                force_gain: 0.001,
            },
        )
    }

    #[test]
    fn test_impedance_settles_to_spring_offset() {
        let mut model = Model::new(&leg_params()).unwrap();
        let mut imp = impedance();
        let id = LegId::new(2).unwrap();

        model.leg_mut(id).tip_force = 500.0;
        model.leg_mut(id).virtual_stiffness = 10.0;
        for _ in 0..5000 {
            imp.update_impedance(id, false, &mut model);
        }

        // gain * force / stiffness
        assert!((model.leg(id).delta_z_m - 0.05).abs() < 1e-3);
        assert_eq!(model.leg(LegId::new(3).unwrap()).delta_z_m, 0.0);
    }

    #[test]
    fn test_leg_stiffness() {
        let mut model = Model::new(&leg_params()).unwrap();
        let mut imp = impedance();
        let id = LegId::new(0).unwrap();
        model.leg_mut(id).state = LegState::WalkingToManual;

        imp.update_leg_stiffness(id, 1.0, &mut model);
        assert!((model.leg(id).virtual_stiffness - 1.0).abs() < 1e-12);
        assert!((model.leg(LegId::new(1).unwrap()).virtual_stiffness - 50.0).abs() < 1e-12);
        assert!((model.leg(LegId::new(5).unwrap()).virtual_stiffness - 50.0).abs() < 1e-12);
        assert_eq!(model.leg(LegId::new(3).unwrap()).virtual_stiffness, 1.0);

        // Lowering back fully restores the nominal stiffness
        model.leg_mut(id).state = LegState::ManualToWalking;
        imp.update_leg_stiffness(id, 1.0, &mut model);
        assert!((model.leg(id).virtual_stiffness - 10.0).abs() < 1e-12);
    }
}
