//! Error types for scene construction.

use haptic_device::DeviceError;
use sim_types::SimError;
use thiserror::Error;

/// Errors from building a scene.
///
/// Only [`SceneBuilder::build`](crate::SceneBuilder::build) returns these.
/// A built scene never fails a tick.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SceneError {
    /// Invalid physics configuration or geometry.
    #[error(transparent)]
    Sim(#[from] SimError),

    /// Invalid device-side configuration.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The builder was not given a required component.
    #[error("scene is missing a {0}")]
    MissingComponent(&'static str),
}

impl SceneError {
    /// Whether the error comes from configuration values rather than a
    /// missing component.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        match self {
            Self::Sim(err) => err.is_config_error(),
            Self::Device(err) => matches!(err, DeviceError::InvalidConfig(_)),
            Self::MissingComponent(_) => false,
        }
    }
}

/// Result type for scene construction.
pub type Result<T> = std::result::Result<T, SceneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_transparent() {
        let err = SceneError::from(SimError::InvalidTimestep(0.0));
        assert_eq!(err.to_string(), SimError::InvalidTimestep(0.0).to_string());
        assert_eq!(
            SceneError::MissingComponent("device").to_string(),
            "scene is missing a device"
        );
    }
}
