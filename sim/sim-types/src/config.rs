//! Global simulation parameters.
//!
//! The configuration is read-only once a scene is built. It is passed
//! explicitly to every stage that needs it; there is no ambient context.

use std::time::Duration;

use crate::dynamics::Gravity;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Timestep, gravity and real-time budget of the simulation tick.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationConfig {
    /// Fixed timestep (seconds).
    pub timestep: f64,
    /// Gravity configuration.
    pub gravity: Gravity,
    /// Soft wall-clock budget for the solver stage of one tick (seconds).
    ///
    /// `None` disables deadline preemption.
    pub tick_budget: Option<f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            timestep: 0.01, // 100 Hz haptic scene rate
            gravity: Gravity::y_down(),
            tick_budget: Some(0.008),
        }
    }
}

impl SimulationConfig {
    /// Create a config with the given timestep.
    #[must_use]
    pub fn with_timestep(timestep: f64) -> Self {
        Self {
            timestep,
            ..Default::default()
        }
    }

    /// Offline configuration: same rate, no deadline.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            tick_budget: None,
            ..Default::default()
        }
    }

    /// Set the gravity.
    #[must_use]
    pub fn gravity(mut self, gravity: Gravity) -> Self {
        self.gravity = gravity;
        self
    }

    /// Disable gravity.
    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Gravity::zero();
        self
    }

    /// Set the solver deadline, in seconds.
    #[must_use]
    pub fn tick_budget(mut self, budget: Option<f64>) -> Self {
        self.tick_budget = budget;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.timestep.is_finite() || self.timestep <= 0.0 {
            return Err(crate::SimError::InvalidTimestep(self.timestep));
        }

        if self.timestep > 1.0 {
            return Err(crate::SimError::invalid_config(
                "timestep > 1 second is likely an error",
            ));
        }

        if !self.gravity.is_finite() {
            return Err(crate::SimError::invalid_config("gravity must be finite"));
        }

        if let Some(budget) = self.tick_budget {
            if !budget.is_finite() || budget <= 0.0 {
                return Err(crate::SimError::invalid_config(format!(
                    "tick budget must be positive, got {budget}"
                )));
            }
        }

        Ok(())
    }

    /// Get the tick frequency in Hz.
    #[must_use]
    pub fn frequency(&self) -> f64 {
        1.0 / self.timestep
    }

    /// The timestep as a [`Duration`].
    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.timestep)
    }

    /// The solver budget as a [`Duration`].
    #[must_use]
    pub fn budget(&self) -> Option<Duration> {
        self.tick_budget.map(Duration::from_secs_f64)
    }
}
