//! Leg and joint records

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::{LegId, LegState};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters describing one leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegParams {
    pub name: String,

    /// Position of the coxa joint in the body frame.
    ///
    /// Units: meters
    pub mount_position_m: [f64; 3],

    /// Yaw of the leg's mounting about the body Z axis.
    ///
    /// Units: radians
    pub mount_yaw_rad: f64,

    /// Tip position of the leg in the default walking stance, body frame.
    ///
    /// Units: meters
    pub default_tip_position_m: [f64; 3],

    /// Joints from the body outwards.
    pub joints: Vec<JointParams>,
}

/// Parameters describing one joint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointParams {
    /// Name matched against incoming joint states.
    pub name: String,

    /// Calibration offset subtracted from the measured position.
    pub position_offset_rad: f64,

    pub packed_position_rad: f64,
    pub unpacked_position_rad: f64,

    pub min_position_rad: f64,
    pub max_position_rad: f64,
}

/// A single joint of a leg.
#[derive(Debug, Clone)]
pub struct Joint {
    pub name: String,

    pub position_offset_rad: f64,
    pub packed_position_rad: f64,
    pub unpacked_position_rad: f64,
    pub min_position_rad: f64,
    pub max_position_rad: f64,

    /// Measured position with the calibration offset removed, `None` until the first joint state.
    pub current_position_rad: Option<f64>,
    pub current_velocity_rads: f64,
    pub current_effort: f64,

    pub desired_position_rad: f64,

    /// Desired position at the last published demand, used to derive the demanded velocity.
    pub prev_desired_position_rad: f64,
}

/// A single leg.
///
/// The tip positions form a pipeline: the walker writes `walker_tip_position_m`, the poser
/// compensates it into `poser_tip_position_m`, the controller subtracts the impedance offset to get
/// `desired_tip_position_m` and inverse kinematics finally produces `local_tip_position_m`, the tip
/// position actually reached by the joint demands.
#[derive(Debug, Clone)]
pub struct Leg {
    pub id: LegId,
    pub name: String,
    pub state: LegState,

    pub mount_position_m: Vector3<f64>,
    pub mount_yaw_rad: f64,
    pub default_tip_position_m: Vector3<f64>,

    pub joints: Vec<Joint>,

    pub walker_tip_position_m: Vector3<f64>,
    pub walker_tip_velocity_ms: Vector3<f64>,
    pub poser_tip_position_m: Vector3<f64>,
    pub desired_tip_position_m: Vector3<f64>,
    pub local_tip_position_m: Vector3<f64>,

    /// True while the tip is in the swing phase of the gait.
    pub swinging: bool,
    pub swing_progress: f64,
    pub stance_progress: f64,

    /// Offset corrected tip force, in `[0, 1000]`.
    pub tip_force: f64,

    /// Vertical tip offset produced by the impedance controller.
    ///
    /// Units: meters
    pub delta_z_m: f64,

    pub virtual_stiffness: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Joint {
    pub fn new(params: &JointParams) -> Self {
        Self {
            name: params.name.clone(),
            position_offset_rad: params.position_offset_rad,
            packed_position_rad: params.packed_position_rad,
            unpacked_position_rad: params.unpacked_position_rad,
            min_position_rad: params.min_position_rad,
            max_position_rad: params.max_position_rad,
            current_position_rad: None,
            current_velocity_rads: 0.0,
            current_effort: 0.0,
            desired_position_rad: 0.0,
            prev_desired_position_rad: 0.0,
        }
    }
}

impl Leg {
    pub fn new(id: LegId, params: &LegParams) -> Self {
        let default_tip = Vector3::from(params.default_tip_position_m);

        Self {
            id,
            name: params.name.clone(),
            state: LegState::Walking,
            mount_position_m: Vector3::from(params.mount_position_m),
            mount_yaw_rad: params.mount_yaw_rad,
            default_tip_position_m: default_tip,
            joints: params.joints.iter().map(Joint::new).collect(),
            walker_tip_position_m: default_tip,
            walker_tip_velocity_ms: Vector3::zeros(),
            poser_tip_position_m: default_tip,
            desired_tip_position_m: default_tip,
            local_tip_position_m: default_tip,
            swinging: false,
            swing_progress: 0.0,
            stance_progress: 0.0,
            tip_force: 0.0,
            delta_z_m: 0.0,
            virtual_stiffness: 1.0,
        }
    }

    /// The "ASC" flag: the leg is either swinging or moving between walking and manual control.
    pub fn asc(&self) -> bool {
        self.swinging || self.state.is_transitioning()
    }
}
