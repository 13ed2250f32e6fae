//! # Joint State Equipment Samples

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{serde::ts_milliseconds, DateTime, Utc};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Joint states reported by the motor interface.
///
/// The vectors are parallel: `position_rad[i]` is the position of the joint named `names[i]`.
/// Velocities and efforts are optional, an empty vector means the interface does not report
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointStates {
    /// UTC timestamp at which the sample was acquired
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Joint names, e.g. `AR_coxa_joint`.
    pub names: Vec<String>,

    /// Raw joint positions, before calibration offsets are removed.
    ///
    /// Units: radians
    pub position_rad: Vec<f64>,

    /// Joint velocities.
    ///
    /// Units: radians/second
    pub velocity_rads: Vec<f64>,

    /// Joint efforts.
    pub effort: Vec<f64>,
}
