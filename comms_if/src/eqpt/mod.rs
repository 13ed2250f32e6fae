//! # Equipment Interface
//!
//! This module defines the samples produced by the hexapod's sensing equipment.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod imu;
pub mod joint;
pub mod tip_force;
