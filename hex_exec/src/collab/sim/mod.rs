//! # Simulated collaborators
//!
//! Deterministic, rate based stand-ins for the walker, poser, impedance controller and inverse
//! kinematics. Every sequence completes after a fixed number of cycles derived from its duration
//! and the cycle period, which makes the state controller testable end to end. None of these make
//! any claim to physical fidelity.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod impedance;
mod kinematics;
mod poser;
mod walker;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

pub use impedance::SimImpedance;
pub use kinematics::SimKinematics;
pub use poser::SimPoser;
pub use walker::SimWalker;

use super::{Collaborators, Tuning};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the simulated collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    /// Coxa, femur and tibia link lengths.
    ///
    /// Units: meters
    pub link_lengths_m: [f64; 3],

    /// Number of cycles of zero velocity command before the walker reports it has stopped.
    pub walker_stop_ticks: u32,

    pub start_up_duration_s: f64,
    pub shut_down_duration_s: f64,
    pub direct_startup_duration_s: f64,
    pub new_stance_duration_s: f64,
    pub leg_manipulation_duration_s: f64,
}

/// Pose controller parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseControllerParams {
    /// Compensate body roll and pitch measured by the IMU.
    pub imu_posing: bool,

    /// Respond to operator pose input.
    pub manual_posing: bool,

    /// Proportional, integral and derivative gains of the IMU rotation controller.
    pub rotation_pid_gains: [f64; 3],

    /// Largest translation reachable by manual posing, X, Y, Z.
    ///
    /// Units: meters
    pub max_translation_m: [f64; 3],

    /// Largest rotation reachable by posing, roll, pitch, yaw.
    ///
    /// Units: radians
    pub max_rotation_rad: [f64; 3],
}

/// Impedance controller constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpedanceParams {
    /// Units: seconds
    pub integrator_step_time_s: f64,

    /// Stiffness multiplier of legs taking extra load while a neighbour is lifted.
    pub load_stiffness_scaler: f64,

    /// Stiffness multiplier of a swinging or lifted leg.
    pub swing_stiffness_scaler: f64,
}

/// Cycle counted progress of a sequence.
#[derive(Debug, Clone, Copy)]
struct Ramp {
    tick: u32,
    ticks_total: u32,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Ramp {
    fn new(duration_s: f64, time_delta_s: f64) -> Self {
        let ticks = if time_delta_s > 0.0 {
            (duration_s / time_delta_s).ceil()
        } else {
            1.0
        };

        Self {
            tick: 0,
            ticks_total: ticks.max(1.0) as u32,
        }
    }

    /// Advance by one cycle and return the completed fraction.
    fn advance(&mut self) -> f64 {
        self.tick = (self.tick + 1).min(self.ticks_total);
        self.tick as f64 / self.ticks_total as f64
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Build a set of simulated collaborators.
pub fn collaborators(
    time_delta_s: f64,
    sim: &SimParams,
    pose: &PoseControllerParams,
    impedance: &ImpedanceParams,
    tuning: &Tuning,
) -> Collaborators {
    let kinematics = SimKinematics::new(sim.link_lengths_m);

    Collaborators {
        walker: Box::new(SimWalker::new(
            time_delta_s,
            sim.walker_stop_ticks,
            *tuning,
        )),
        poser: Box::new(SimPoser::new(
            time_delta_s,
            sim.clone(),
            pose.clone(),
            kinematics.clone(),
        )),
        impedance: Box::new(SimImpedance::new(impedance.clone(), *tuning)),
        kinematics: Box::new(kinematics),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ramp() {
        let mut ramp = Ramp::new(0.5, 0.125);
        let fracs: Vec<f64> = (0..5).map(|_| ramp.advance()).collect();
        assert_eq!(fracs, vec![0.25, 0.5, 0.75, 1.0, 1.0]);

        // Durations shorter than a cycle still take one cycle
        assert_eq!(Ramp::new(0.0, 0.125).advance(), 1.0);
    }
}
