//! State controller telemetry

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::Serialize;

use super::Context;
use crate::{collab::PoseError, model::LegState};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Telemetry published once per second.
#[derive(Debug, Clone, Serialize)]
pub struct StateCtrlTm {
    pub legs: Vec<LegStateTm>,
    pub body_velocity: BodyVelocityTm,
    pub pose: PoseTm,
    pub imu: Option<ImuTm>,
    pub rotation_error: PoseErrorTm,
    pub translation_error: PoseErrorTm,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegStateTm {
    pub name: String,
    pub state: LegState,

    pub walker_tip_position_m: [f64; 3],
    pub poser_tip_position_m: [f64; 3],
    pub local_tip_position_m: [f64; 3],

    /// Swing and stance progress, or -1 outside of the phase.
    pub swing_progress: f64,
    pub stance_progress: f64,

    pub tip_force: f64,
    pub delta_z_m: f64,
    pub virtual_stiffness: f64,

    /// Swinging or moving between walking and manual control.
    pub asc: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BodyVelocityTm {
    /// Acceleration limited velocity from the walker.
    pub linear_ms: [f64; 2],
    pub angular_rads: f64,

    /// Per leg tip velocity along X, opposite to the body motion.
    pub tip_velocity_x_ms: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoseTm {
    pub position_m: [f64; 3],
    pub rotation_rpy_rad: [f64; 3],
}

#[derive(Debug, Clone, Serialize)]
pub struct ImuTm {
    pub orientation_rpy_rad: [f64; 3],
    pub linear_acceleration_mss: [f64; 3],
    pub angular_velocity_rads: [f64; 3],
}

#[derive(Debug, Clone, Serialize)]
pub struct PoseErrorTm {
    pub absement: [f64; 3],
    pub position: [f64; 3],
    pub velocity: [f64; 3],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl StateCtrlTm {
    pub fn from_ctx(ctx: &Context) -> Self {
        let legs = ctx
            .model
            .legs()
            .map(|leg| LegStateTm {
                name: leg.name.clone(),
                state: leg.state,
                walker_tip_position_m: to_array(&leg.walker_tip_position_m),
                poser_tip_position_m: to_array(&leg.poser_tip_position_m),
                local_tip_position_m: to_array(&leg.local_tip_position_m),
                swing_progress: if leg.swinging { leg.swing_progress } else { -1.0 },
                stance_progress: if leg.swinging { -1.0 } else { leg.stance_progress },
                tip_force: leg.tip_force,
                delta_z_m: leg.delta_z_m,
                virtual_stiffness: leg.virtual_stiffness,
                asc: leg.asc(),
            })
            .collect();

        let velocity = ctx.collab.walker.body_velocity();
        let body_velocity = BodyVelocityTm {
            linear_ms: [velocity.linear.x, velocity.linear.y],
            angular_rads: velocity.angular,
            tip_velocity_x_ms: ctx
                .model
                .legs()
                .map(|l| -l.walker_tip_velocity_ms.x)
                .collect(),
        };

        let pose = ctx.collab.poser.current_pose();
        let (roll, pitch, yaw) = pose.rotation.euler_angles();

        let imu = ctx.collab.poser.imu_data().map(|imu| {
            let (roll, pitch, yaw) = imu.orientation.euler_angles();
            ImuTm {
                orientation_rpy_rad: [roll, pitch, yaw],
                linear_acceleration_mss: to_array(&imu.linear_acceleration),
                angular_velocity_rads: to_array(&imu.angular_velocity),
            }
        });

        Self {
            legs,
            body_velocity,
            pose: PoseTm {
                position_m: to_array(&pose.position),
                rotation_rpy_rad: [roll, pitch, yaw],
            },
            imu,
            rotation_error: ctx.collab.poser.rotation_error().into(),
            translation_error: ctx.collab.poser.translation_error().into(),
        }
    }
}

impl From<PoseError> for PoseErrorTm {
    fn from(e: PoseError) -> Self {
        Self {
            absement: to_array(&e.absement),
            position: to_array(&e.position),
            velocity: to_array(&e.velocity),
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn to_array(v: &Vector3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::state_ctrl::context::test::test_context;

    #[test]
    fn test_tm_snapshot() {
        let ctx = test_context();
        let tm = StateCtrlTm::from_ctx(&ctx);

        assert_eq!(tm.legs.len(), crate::model::NUM_LEGS);
        assert_eq!(tm.legs[0].name, "AR");
        assert_eq!(tm.legs[0].swing_progress, -1.0);
        assert!(tm.imu.is_none());
        assert_eq!(tm.pose.position_m, [0.0; 3]);

        // Serialises for the session archive
        let json = serde_json::to_string(&tm).unwrap();
        assert!(json.contains("\"tip_velocity_x_ms\""));
    }
}
