//! Error types for the device link.

use thiserror::Error;

/// Errors reported by a device transport or the acquisition thread.
///
/// None of these reach the simulation tick: the link absorbs them into
/// [`DeviceStatus`](crate::DeviceStatus) and logs them.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    /// The device is not connected.
    #[error("device '{0}' is not connected")]
    NotConnected(String),

    /// The transport failed to read or write.
    #[error("transport error: {0}")]
    Transport(String),

    /// A sample did not arrive in time.
    #[error("no sample for {waited_ms} ms (limit {limit_ms} ms)")]
    Timeout {
        /// How long the link waited.
        waited_ms: u64,
        /// Configured limit.
        limit_ms: u64,
    },

    /// Invalid link, portal or feedback configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The acquisition thread could not be started or panicked.
    #[error("acquisition thread failure: {0}")]
    Thread(String),
}

impl DeviceError {
    /// Creates a not-connected error.
    #[must_use]
    pub fn not_connected(device: impl Into<String>) -> Self {
        Self::NotConnected(device.into())
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport(reason.into())
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Whether the device is gone rather than misbehaving.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::NotConnected(_) | Self::Timeout { .. })
    }
}

/// Result type for device operations.
pub type Result<T> = std::result::Result<T, DeviceError>;
