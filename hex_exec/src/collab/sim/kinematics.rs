//! Planar three joint leg kinematics

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::debug;
use nalgebra::Vector3;
use std::f64::consts::PI;
use util::maths::clamp;

use crate::{collab::Kinematics, model::Leg};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Coxa yaw followed by femur and tibia pitch joints, knee up.
#[derive(Debug, Clone)]
pub struct SimKinematics {
    link_lengths_m: [f64; 3],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimKinematics {
    pub fn new(link_lengths_m: [f64; 3]) -> Self {
        Self { link_lengths_m }
    }

    /// Joint angles placing the tip of `leg` at `tip_m` (body frame).
    ///
    /// Targets out of reach are pulled onto the edge of the workspace, in which case the returned
    /// flag is false.
    pub fn solve(&self, leg: &Leg, tip_m: &Vector3<f64>) -> ([f64; 3], bool) {
        let [coxa_m, femur_m, tibia_m] = self.link_lengths_m;

        // Into the leg frame
        let rel = tip_m - leg.mount_position_m;
        let (s, c) = (-leg.mount_yaw_rad).sin_cos();
        let x = c * rel.x - s * rel.y;
        let y = s * rel.x + c * rel.y;
        let z = rel.z;

        let coxa_rad = y.atan2(x);
        let r = (x.powi(2) + y.powi(2)).sqrt() - coxa_m;

        // Limit target distance to be within reach of the femur and tibia
        let max_dist_m = femur_m + tibia_m;
        let min_dist_m = (femur_m - tibia_m).abs().max(1e-6);
        let mut dist_m = (r.powi(2) + z.powi(2)).sqrt();
        let mut reachable = true;
        if dist_m > max_dist_m {
            dist_m = max_dist_m;
            reachable = false;
        } else if dist_m < min_dist_m {
            dist_m = min_dist_m;
            reachable = false;
        }

        let hip_rad = clamp(
            (femur_m.powi(2) + dist_m.powi(2) - tibia_m.powi(2)) / (2.0 * femur_m * dist_m),
            -1.0,
            1.0,
        )
        .acos();
        let knee_rad = clamp(
            (femur_m.powi(2) + tibia_m.powi(2) - dist_m.powi(2)) / (2.0 * femur_m * tibia_m),
            -1.0,
            1.0,
        )
        .acos();

        (
            [coxa_rad, z.atan2(r) + hip_rad, -(PI - knee_rad)],
            reachable,
        )
    }

    /// Tip position (body frame) for the given joint angles.
    pub fn forward(&self, leg: &Leg, angles_rad: &[f64; 3]) -> Vector3<f64> {
        let [coxa_m, femur_m, tibia_m] = self.link_lengths_m;
        let [coxa_rad, femur_rad, tibia_rad] = *angles_rad;

        let r = coxa_m + femur_m * femur_rad.cos() + tibia_m * (femur_rad + tibia_rad).cos();
        let z = femur_m * femur_rad.sin() + tibia_m * (femur_rad + tibia_rad).sin();
        let (x, y) = (r * coxa_rad.cos(), r * coxa_rad.sin());

        let (s, c) = leg.mount_yaw_rad.sin_cos();
        leg.mount_position_m + Vector3::new(c * x - s * y, s * x + c * y, z)
    }
}

impl Kinematics for SimKinematics {
    fn apply_ik(&mut self, leg: &mut Leg, debug: bool) -> bool {
        if leg.joints.len() != 3 {
            if debug {
                debug!("{} has {} joints, IK needs 3", leg.name, leg.joints.len());
            }
            return false;
        }

        let (mut angles, mut ok) = self.solve(leg, &leg.desired_tip_position_m);

        for (angle, joint) in angles.iter_mut().zip(leg.joints.iter_mut()) {
            let limited = clamp(*angle, joint.min_position_rad, joint.max_position_rad);
            if limited != *angle {
                ok = false;
            }
            *angle = limited;
            joint.desired_position_rad = limited;
        }

        leg.local_tip_position_m = self.forward(leg, &angles);

        if debug && !ok {
            debug!(
                "{} IK clamped: desired tip {:?}, reached {:?}",
                leg.name,
                leg.desired_tip_position_m.as_slice(),
                leg.local_tip_position_m.as_slice()
            );
        }

        ok
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{test::leg_params, LegId, Model};

    #[test]
    fn test_ik_reaches_default_stance() {
        let mut model = Model::new(&leg_params()).unwrap();
        let mut kin = SimKinematics::new([0.05, 0.1, 0.12]);

        for leg in model.legs_mut() {
            leg.desired_tip_position_m = leg.default_tip_position_m;
            assert!(kin.apply_ik(leg, true), "{} not reachable", leg.name);
            assert!((leg.local_tip_position_m - leg.desired_tip_position_m).norm() < 1e-9);
            // Knee up
            assert!(leg.joints[2].desired_position_rad < 0.0);
        }
    }

    #[test]
    fn test_ik_clamps_out_of_reach() {
        let mut model = Model::new(&leg_params()).unwrap();
        let mut kin = SimKinematics::new([0.05, 0.1, 0.12]);

        let leg = model.leg_mut(LegId::new(1).unwrap());
        leg.desired_tip_position_m = Vector3::new(0.0, -1.0, -0.1);

        assert!(!kin.apply_ik(leg, false));
        let reach = (leg.local_tip_position_m - leg.mount_position_m).norm();
        assert!(reach < 0.05 + 0.1 + 0.12 + 1e-9);
    }
}
