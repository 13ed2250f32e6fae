//! # Communications interface crate.
//!
//! Provides the payloads of every input channel of the hexapod controller: operator commands
//! coming from the remote, and samples coming from the robot's sensors.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Operator commands (telecommands) sent by the hexapod remote
pub mod tc;

/// Sensor samples produced by the robot's equipment (IMU, joint encoders, tip force sensors)
pub mod eqpt;
