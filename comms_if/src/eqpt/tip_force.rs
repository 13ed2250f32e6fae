//! # Tip Force Equipment Samples

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{serde::ts_milliseconds, DateTime, Utc};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Raw readings from the tip force sensors.
///
/// The sensor board reports two channels per leg, the force reading for leg `n` is at index
/// `2 * n`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipForces {
    /// UTC timestamp at which the sample was acquired
    #[serde(with = "ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    /// Raw (uncalibrated) effort readings.
    pub raw_effort: Vec<f64>,
}
