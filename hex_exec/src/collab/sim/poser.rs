//! Simulated pose controller

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use nalgebra::{UnitQuaternion, Vector3};
use util::maths::clamp;

use super::{PoseControllerParams, Ramp, SimKinematics, SimParams};
use crate::{
    collab::{ImuData, Pose, PoseError, PoseResetMode, Poser},
    model::Model,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A pose controller running its sequences as straight line sweeps in joint space.
#[derive(Debug, Clone)]
pub struct SimPoser {
    time_delta_s: f64,
    params: SimParams,
    pose_params: PoseControllerParams,
    kinematics: SimKinematics,

    reset_mode: PoseResetMode,
    manual_translation: Vector3<f64>,
    manual_rotation: Vector3<f64>,
    imu: Option<ImuData>,

    pose: Pose,

    /// Rotation about the ground point under the body.
    body_height_m: f64,

    rotation_error: PoseError,
    translation_error: PoseError,

    sweep: Option<JointSweep>,
    ramp: Option<(Sequence, Ramp)>,

    /// Number of legs not bearing load, from the last default pose calculation.
    unloaded_legs: usize,
}

/// Joint space sweep, joints in model order.
#[derive(Debug, Clone)]
struct JointSweep {
    sequence: Sequence,
    start_rad: Vec<f64>,
    goal_rad: Vec<f64>,
    ramp: Ramp,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sequence {
    DirectStartup,
    Unpack,
    Pack,
    StartUp,
    ShutDown,
    NewStance,
    LegManipulation,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimPoser {
    pub fn new(
        time_delta_s: f64,
        params: SimParams,
        pose_params: PoseControllerParams,
        kinematics: SimKinematics,
    ) -> Self {
        Self {
            time_delta_s,
            params,
            pose_params,
            kinematics,
            reset_mode: PoseResetMode::NoReset,
            manual_translation: Vector3::zeros(),
            manual_rotation: Vector3::zeros(),
            imu: None,
            pose: Pose::default(),
            body_height_m: 0.0,
            rotation_error: PoseError::default(),
            translation_error: PoseError::default(),
            sweep: None,
            ramp: None,
            unloaded_legs: 0,
        }
    }

    /// Advance the sweep for `sequence`, starting it from the current demands if it isn't running.
    ///
    /// Returns the completed fraction.
    fn sweep(
        slot: &mut Option<JointSweep>,
        sequence: Sequence,
        duration_s: f64,
        time_delta_s: f64,
        model: &mut Model,
        goal: impl FnOnce(&Model) -> Vec<f64>,
    ) -> f64 {
        let restart = match slot {
            Some(s) => s.sequence != sequence,
            None => true,
        };
        if restart {
            *slot = Some(JointSweep {
                sequence,
                start_rad: model.joints().map(|j| j.desired_position_rad).collect(),
                goal_rad: goal(&*model),
                ramp: Ramp::new(duration_s, time_delta_s),
            });
        }

        let frac = match slot {
            Some(sweep) => {
                let frac = sweep.ramp.advance();
                let joints = model.legs_mut().flat_map(|l| l.joints.iter_mut());
                for (joint, (s, g)) in joints.zip(sweep.start_rad.iter().zip(sweep.goal_rad.iter()))
                {
                    joint.desired_position_rad = s + (g - s) * frac;
                }
                frac
            }
            None => 1.0,
        };

        if frac >= 1.0 {
            *slot = None;
        }
        frac
    }

    /// Advance a sequence which only takes time.
    fn wait(&mut self, sequence: Sequence, duration_s: f64) -> f64 {
        let restart = match self.ramp {
            Some((s, _)) => s != sequence,
            None => true,
        };
        if restart {
            self.ramp = Some((sequence, Ramp::new(duration_s, self.time_delta_s)));
        }

        let frac = match self.ramp {
            Some((_, ref mut ramp)) => ramp.advance(),
            None => 1.0,
        };

        if frac >= 1.0 {
            self.ramp = None;
        }
        frac
    }

    /// Joint positions of every leg in its default stance.
    fn stance_joints(kinematics: &SimKinematics, model: &Model) -> Vec<f64> {
        model
            .legs()
            .flat_map(|leg| {
                if leg.joints.len() == 3 {
                    let (angles, _) = kinematics.solve(leg, &leg.default_tip_position_m);
                    leg.joints
                        .iter()
                        .zip(angles.iter())
                        .map(|(j, a)| clamp(*a, j.min_position_rad, j.max_position_rad))
                        .collect::<Vec<f64>>()
                } else {
                    leg.joints.iter().map(|j| j.desired_position_rad).collect()
                }
            })
            .collect()
    }

    /// Place every tip in the default stance, used once the body is standing.
    fn stand(model: &mut Model) {
        for leg in model.legs_mut() {
            leg.walker_tip_position_m = leg.default_tip_position_m;
            leg.poser_tip_position_m = leg.default_tip_position_m;
            leg.desired_tip_position_m = leg.default_tip_position_m;
            leg.local_tip_position_m = leg.default_tip_position_m;
        }
    }

    fn update_error(error: &mut PoseError, position: Vector3<f64>, dt: f64) {
        if dt > 0.0 {
            error.velocity = (position - error.position) / dt;
        }
        error.absement += position * dt;
        error.position = position;
    }
}

impl Poser for SimPoser {
    fn update_current_pose(&mut self, body_height_m: f64, _model: &Model) {
        let dt = self.time_delta_s;
        let max_t = Vector3::from(self.pose_params.max_translation_m);
        let max_r = Vector3::from(self.pose_params.max_rotation_rad);

        self.body_height_m = body_height_m;

        let (mut translation, mut rotation) = if self.pose_params.manual_posing {
            (
                self.manual_translation.component_mul(&max_t),
                self.manual_rotation.component_mul(&max_r),
            )
        } else {
            (Vector3::zeros(), Vector3::zeros())
        };

        // Level the body against the roll and pitch measured by the IMU
        if let (true, Some(imu)) = (self.pose_params.imu_posing, self.imu) {
            let (roll, pitch, _) = imu.orientation.euler_angles();
            let [kp, ki, kd] = self.pose_params.rotation_pid_gains;
            Self::update_error(
                &mut self.rotation_error,
                Vector3::new(-roll, -pitch, 0.0),
                dt,
            );
            rotation += self.rotation_error.position * kp
                + self.rotation_error.absement * ki
                + self.rotation_error.velocity * kd;
        }

        match self.reset_mode {
            PoseResetMode::NoReset => (),
            PoseResetMode::ZAndYawReset => {
                translation.z = 0.0;
                rotation.z = 0.0;
            }
            PoseResetMode::XAndYReset => {
                translation.x = 0.0;
                translation.y = 0.0;
            }
            PoseResetMode::PitchAndRollReset => {
                rotation.x = 0.0;
                rotation.y = 0.0;
            }
            PoseResetMode::AllReset | PoseResetMode::ImmediateAllReset => {
                translation = Vector3::zeros();
                rotation = Vector3::zeros();
            }
        }

        // Resets complete within the cycle, except the immediate reset which is owned by whoever
        // requested it
        if !matches!(
            self.reset_mode,
            PoseResetMode::NoReset | PoseResetMode::ImmediateAllReset
        ) {
            self.reset_mode = PoseResetMode::NoReset;
        }

        for i in 0..3 {
            translation[i] = clamp(translation[i], -max_t[i], max_t[i]);
            rotation[i] = clamp(rotation[i], -max_r[i], max_r[i]);
        }

        let position_error = translation - self.pose.position;
        Self::update_error(&mut self.translation_error, position_error, dt);

        self.pose = Pose {
            position: translation,
            rotation: UnitQuaternion::from_euler_angles(rotation.x, rotation.y, rotation.z),
        };
    }

    fn direct_startup(&mut self, model: &mut Model) -> f64 {
        let kin = &self.kinematics;
        let frac = Self::sweep(
            &mut self.sweep,
            Sequence::DirectStartup,
            self.params.direct_startup_duration_s,
            self.time_delta_s,
            model,
            |m| Self::stance_joints(kin, m),
        );
        if frac >= 1.0 {
            Self::stand(model);
        }
        frac
    }

    fn unpack_legs(&mut self, duration_s: f64, model: &mut Model) -> bool {
        Self::sweep(
            &mut self.sweep,
            Sequence::Unpack,
            duration_s,
            self.time_delta_s,
            model,
            |m| m.joints().map(|j| j.unpacked_position_rad).collect(),
        ) >= 1.0
    }

    fn pack_legs(&mut self, duration_s: f64, model: &mut Model) -> bool {
        Self::sweep(
            &mut self.sweep,
            Sequence::Pack,
            duration_s,
            self.time_delta_s,
            model,
            |m| m.joints().map(|j| j.packed_position_rad).collect(),
        ) >= 1.0
    }

    fn start_up_sequence(&mut self, model: &mut Model) -> bool {
        let kin = &self.kinematics;
        let complete = Self::sweep(
            &mut self.sweep,
            Sequence::StartUp,
            self.params.start_up_duration_s,
            self.time_delta_s,
            model,
            |m| Self::stance_joints(kin, m),
        ) >= 1.0;
        if complete {
            Self::stand(model);
        }
        complete
    }

    fn shut_down_sequence(&mut self, model: &mut Model) -> bool {
        Self::sweep(
            &mut self.sweep,
            Sequence::ShutDown,
            self.params.shut_down_duration_s,
            self.time_delta_s,
            model,
            |m| m.joints().map(|j| j.unpacked_position_rad).collect(),
        ) >= 1.0
    }

    fn step_to_new_stance(&mut self, _model: &mut Model) -> f64 {
        self.wait(Sequence::NewStance, self.params.new_stance_duration_s)
    }

    fn calculate_default_pose(&mut self, model: &Model) {
        let unloaded = model.count_manual_or_transitioning();
        if unloaded != self.unloaded_legs {
            trace!("Default pose recalculated for {} unloaded legs", unloaded);
        }
        self.unloaded_legs = unloaded;
    }

    fn pose_for_leg_manipulation(&mut self, _model: &mut Model) -> f64 {
        self.wait(
            Sequence::LegManipulation,
            self.params.leg_manipulation_duration_s,
        )
    }

    fn pose_reset_mode(&self) -> PoseResetMode {
        self.reset_mode
    }

    fn set_pose_reset_mode(&mut self, mode: PoseResetMode) {
        self.reset_mode = mode;
    }

    fn set_manual_pose_input(&mut self, translation: Vector3<f64>, rotation: Vector3<f64>) {
        self.manual_translation = translation;
        self.manual_rotation = rotation;
    }

    fn set_imu_data(&mut self, imu: ImuData) {
        self.imu = Some(imu);
    }

    fn imu_data(&self) -> Option<&ImuData> {
        self.imu.as_ref()
    }

    fn update_stance(&mut self, model: &mut Model) {
        let centre = Vector3::new(0.0, 0.0, -self.body_height_m);
        let inverse = self.pose.rotation.inverse();

        for leg in model.legs_mut() {
            leg.poser_tip_position_m =
                inverse * (leg.walker_tip_position_m - self.pose.position - centre) + centre;
        }
    }

    fn current_pose(&self) -> Pose {
        self.pose
    }

    fn rotation_error(&self) -> PoseError {
        self.rotation_error
    }

    fn translation_error(&self) -> PoseError {
        self.translation_error
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::test::leg_params;

    fn poser() -> SimPoser {
        SimPoser::new(
            0.125,
            SimParams {
                link_lengths_m: [0.05, 0.1, 0.12],
                walker_stop_ticks: 2,
                start_up_duration_s: 0.5,
                shut_down_duration_s: 0.5,
                direct_startup_duration_s: 0.5,
                new_stance_duration_s: 0.25,
                leg_manipulation_duration_s: 0.25,
            },
            PoseControllerParams {
                imu_posing: true,
                manual_posing: true,
                rotation_pid_gains: [1.0, 0.0, 0.0],
                max_translation_m: [0.05, 0.05, 0.05],
                max_rotation_rad: [0.2, 0.2, 0.2],
            },
            SimKinematics::new([0.05, 0.1, 0.12]),
        )
    }

    #[test]
    fn test_pack_sweep() {
        let mut model = Model::new(&leg_params()).unwrap();
        let mut poser = poser();

        // 1 s at 0.125 s per cycle
        for _ in 0..7 {
            assert!(!poser.pack_legs(1.0, &mut model));
        }
        assert!(poser.pack_legs(1.0, &mut model));
        assert!(model
            .joints()
            .all(|j| (j.desired_position_rad - j.packed_position_rad).abs() < 1e-12));

        // A new sequence starts from where the last one ended
        assert!(!poser.unpack_legs(0.25, &mut model));
        assert!(poser.unpack_legs(0.25, &mut model));
        assert!(model
            .joints()
            .all(|j| (j.desired_position_rad - j.unpacked_position_rad).abs() < 1e-12));
    }

    #[test]
    fn test_direct_startup_stands() {
        let mut model = Model::new(&leg_params()).unwrap();
        let mut poser = poser();

        let fracs: Vec<f64> = (0..4).map(|_| poser.direct_startup(&mut model)).collect();
        assert_eq!(fracs, vec![0.25, 0.5, 0.75, 1.0]);
        for leg in model.legs() {
            assert_eq!(leg.poser_tip_position_m, leg.default_tip_position_m);
        }
    }

    #[test]
    fn test_manual_pose_and_reset() {
        let model = Model::new(&leg_params()).unwrap();
        let mut poser = poser();

        poser.set_manual_pose_input(Vector3::new(1.0, 0.0, -0.5), Vector3::new(0.0, 0.0, 2.0));
        poser.update_current_pose(0.1, &model);
        let pose = poser.current_pose();
        assert!((pose.position - Vector3::new(0.05, 0.0, -0.025)).norm() < 1e-12);
        assert!((pose.rotation.euler_angles().2 - 0.2).abs() < 1e-9);

        poser.set_pose_reset_mode(PoseResetMode::XAndYReset);
        poser.update_current_pose(0.1, &model);
        assert_eq!(poser.current_pose().position.x, 0.0);
        assert_eq!(poser.pose_reset_mode(), PoseResetMode::NoReset);

        // Immediate resets stay until cleared by the requester
        poser.set_pose_reset_mode(PoseResetMode::ImmediateAllReset);
        poser.update_current_pose(0.1, &model);
        assert_eq!(poser.current_pose().position, Vector3::zeros());
        assert_eq!(poser.pose_reset_mode(), PoseResetMode::ImmediateAllReset);
    }

    #[test]
    fn test_imu_levelling() {
        let model = Model::new(&leg_params()).unwrap();
        let mut poser = poser();

        poser.set_imu_data(ImuData {
            orientation: UnitQuaternion::from_euler_angles(0.1, 0.0, 0.0),
            linear_acceleration: Vector3::new(0.0, 0.0, 9.81),
            angular_velocity: Vector3::zeros(),
        });
        poser.update_current_pose(0.1, &model);

        assert!((poser.current_pose().rotation.euler_angles().0 + 0.1).abs() < 1e-9);
        assert!((poser.rotation_error().position.x + 0.1).abs() < 1e-9);
    }
}
