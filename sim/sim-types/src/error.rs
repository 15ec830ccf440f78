//! Error types for simulation construction.
//!
//! Only construction can fail. Anomalies met while stepping (solver
//! non-convergence, degenerate contact normals, residual penetration) are
//! absorbed by the pipeline and surfaced through counters instead.

use thiserror::Error;

/// Errors that can occur while building or configuring a simulation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Invalid body ID referenced.
    #[error("invalid body ID: {0}")]
    InvalidBodyId(u64),

    /// A body with this ID already exists.
    #[error("duplicate body ID: {0}")]
    DuplicateBodyId(u64),

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Joint limits are inverted or not finite.
    #[error("joint '{joint}' has inconsistent limits: [{min}, {max}]")]
    InvalidJointLimits {
        /// Name of the offending joint.
        joint: String,
        /// Lower position limit.
        min: f64,
        /// Upper position limit.
        max: f64,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Invalid collision geometry.
    #[error("invalid geometry: {reason}")]
    InvalidGeometry {
        /// Description of what's wrong.
        reason: String,
    },

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMassProperties {
        /// Description of what's wrong.
        reason: String,
    },
}

impl SimError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid geometry error.
    #[must_use]
    pub fn invalid_geometry(reason: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            reason: reason.into(),
        }
    }

    /// Create an invalid mass properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMassProperties {
            reason: reason.into(),
        }
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::InvalidTimestep(_) | Self::InvalidJointLimits { .. }
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::InvalidJointLimits {
            joint: "jaw_1".to_string(),
            min: 1.0,
            max: -1.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("jaw_1"));
        assert!(msg.contains("[1, -1]"));

        let err = SimError::invalid_geometry("min >= max on axis y");
        assert!(err.to_string().contains("axis y"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(SimError::invalid_config("bad").is_config_error());
        assert!(SimError::InvalidTimestep(-0.01).is_config_error());
        assert!(!SimError::invalid_mass("negative").is_config_error());
    }
}
