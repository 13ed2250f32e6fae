//! # IMU Equipment Samples

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{serde::ts_milliseconds, DateTime, Utc};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single sample from the IMU, expressed in the sensor's own (mounting) frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImuSample {
    /// UTC timestamp at which the sample was acquired
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Orientation quaternion, in `[w, x, y, z]` order.
    pub orientation_q: [f64; 4],

    /// Linear acceleration.
    ///
    /// Units: meters/second^2
    pub linear_accel_mss: [f64; 3],

    /// Angular velocity.
    ///
    /// Units: radians/second
    pub angular_vel_rads: [f64; 3],
}
