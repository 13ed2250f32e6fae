//! # Telecommand module
//!
//! This module provides the operator commands sent by the hexapod remote. Each variant of [`Tc`]
//! is one input channel of the state controller.
//!
//! Mode selectors and discrete commands carry the small integer codes used by the remote, the
//! controller is responsible for decoding (and rejecting) them.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use serde_json::{self, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A telecommand, i.e. an instruction sent to the hexapod by the operator's remote.
///
/// Serialised in JSON as `{"type": "BODY_VELOCITY", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tc {
    /// Desired body velocity.
    BodyVelocity {
        /// Linear velocity in the body XY plane.
        ///
        /// Units: meters/second
        linear_ms: [f64; 2],

        /// Angular velocity about the body Z axis.
        ///
        /// Units: radians/second
        angular_rads: f64,
    },

    /// Tip velocity of the leg under primary manual control.
    ///
    /// Units: meters/second
    PrimaryTipVelocity([f64; 3]),

    /// Tip velocity of the leg under secondary manual control.
    ///
    /// Units: meters/second
    SecondaryTipVelocity([f64; 3]),

    /// Manual body pose input.
    BodyPose {
        /// Translation input, X, Y, Z.
        linear: [f64; 3],

        /// Rotation input, roll, pitch, yaw.
        angular: [f64; 3],
    },

    /// Requested system state code.
    SystemState(i8),

    /// Requested gait code.
    GaitSelection(i8),

    /// Posing mode code.
    PosingMode(i8),

    /// Cruise control mode code (0 = off, 1 = on).
    CruiseControl(i8),

    /// Auto navigation mode code (0 = off, 1 = on).
    AutoNavigation(i8),

    /// Selected adjustable parameter code.
    ParameterSelection(i8),

    /// Parameter adjustment direction, -1, 0 or 1.
    ParameterAdjust(i8),

    /// Leg selected for primary manual control, -1 for none.
    PrimaryLegSelection(i8),

    /// Leg selected for secondary manual control, -1 for none.
    SecondaryLegSelection(i8),

    /// Requested state of the primary leg.
    PrimaryLegState(i8),

    /// Requested state of the secondary leg.
    SecondaryLegState(i8),

    /// Pose reset mode code.
    PoseResetMode(i8),
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum TcParseError {
    #[error("TC contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("TC has an invalid type ({0})")]
    InvalidType(String),

    #[error("TC of type {0} has an invalid payload: {1}")]
    InvalidPayload(String, serde_json::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Tc {
    /// Parse a new TC from a JSON packet
    pub fn from_json(json_str: &str) -> Result<Self, TcParseError> {
        // Parse the JSON string into a value
        let val: Value = serde_json::from_str(json_str).map_err(TcParseError::InvalidJson)?;

        // Check the type before parsing the whole TC so that the error is more helpful than
        // serde's "unknown variant"
        let tc_type = match val["type"].as_str() {
            Some(s) => s.to_string(),
            None => {
                return Err(TcParseError::InvalidType(String::from(
                    "Expected \"type\" to be a string",
                )))
            }
        };

        serde_json::from_value(val).map_err(|e| TcParseError::InvalidPayload(tc_type, e))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_tcs() {
        assert_eq!(
            Tc::from_json(r#"{"type": "SYSTEM_STATE", "payload": 3}"#).unwrap(),
            Tc::SystemState(3)
        );

        assert_eq!(
            Tc::from_json(
                r#"{"type": "BODY_VELOCITY", "payload": {"linear_ms": [0.3, 0.0], "angular_rads": 0.1}}"#
            )
            .unwrap(),
            Tc::BodyVelocity {
                linear_ms: [0.3, 0.0],
                angular_rads: 0.1
            }
        );

        assert_eq!(
            Tc::from_json(r#"{"type": "PRIMARY_TIP_VELOCITY", "payload": [0.0, 0.1, -0.1]}"#)
                .unwrap(),
            Tc::PrimaryTipVelocity([0.0, 0.1, -0.1])
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Tc::from_json("{not json"),
            Err(TcParseError::InvalidJson(_))
        ));
        assert!(matches!(
            Tc::from_json(r#"{"payload": 1}"#),
            Err(TcParseError::InvalidType(_))
        ));
        assert!(matches!(
            Tc::from_json(r#"{"type": "WARP_DRIVE", "payload": 1}"#),
            Err(TcParseError::InvalidPayload(_, _))
        ));
        assert!(matches!(
            Tc::from_json(r#"{"type": "GAIT_SELECTION", "payload": "tripod"}"#),
            Err(TcParseError::InvalidPayload(_, _))
        ));
    }
}
