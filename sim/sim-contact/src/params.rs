//! Proximity thresholds and per-pair contact budget.
//!
//! Two distances drive the contact lifecycle:
//!
//! ```text
//!   gap ≥ alarm_distance                 → not reported
//!   contact_distance ≤ gap < alarm       → reported, inactive (alarm band)
//!   gap < contact_distance               → reported, active (solved)
//! ```
//!
//! Pre-detecting a pair in the alarm band gives the solver lead time before
//! the surfaces meet and keeps contacts from flickering in and out.

use crate::FrictionCone;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Proximity and friction parameters for contact generation.
///
/// # Example
///
/// ```
/// use sim_contact::ProximityParams;
///
/// let params = ProximityParams::reference_scene();
/// assert!(params.validate().is_ok());
/// assert!(params.is_active(0.05));
/// assert!(params.is_reported(1.0) && !params.is_active(1.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProximityParams {
    /// Gap below which a pair produces contact points.
    pub alarm_distance: f64,

    /// Gap below which a contact is handed to the solver.
    ///
    /// Must not exceed `alarm_distance`.
    pub contact_distance: f64,

    /// Coulomb friction coefficient applied to every contact.
    pub friction_coefficient: f64,

    /// Contacts of one pair closer than this are merged (deepest survives).
    pub merge_distance: f64,

    /// Cap on contact points kept per body pair.
    pub max_contacts_per_pair: usize,
}

impl Default for ProximityParams {
    fn default() -> Self {
        Self::reference_scene()
    }
}

impl ProximityParams {
    /// Thresholds of the grasper-on-floor scene.
    ///
    /// Alarm distance 2, contact distance 0.1 and a friction cone half-angle
    /// of 0.1 rad.
    #[must_use]
    pub fn reference_scene() -> Self {
        Self {
            alarm_distance: 2.0,
            contact_distance: 0.1,
            friction_coefficient: FrictionCone::from_half_angle(0.1).mu,
            merge_distance: 0.05,
            max_contacts_per_pair: 4,
        }
    }

    /// Set the alarm and contact distances.
    #[must_use]
    pub fn with_distances(mut self, alarm_distance: f64, contact_distance: f64) -> Self {
        self.alarm_distance = alarm_distance;
        self.contact_distance = contact_distance;
        self
    }

    /// Set friction from a cone half-angle in radians.
    #[must_use]
    pub fn with_cone_angle(mut self, angle: f64) -> Self {
        self.friction_coefficient = FrictionCone::from_half_angle(angle).mu;
        self
    }

    /// Set the friction coefficient directly.
    #[must_use]
    pub fn with_friction(mut self, mu: f64) -> Self {
        self.friction_coefficient = mu;
        self
    }

    /// Set the per-pair contact cap.
    #[must_use]
    pub fn with_max_contacts_per_pair(mut self, max: usize) -> Self {
        self.max_contacts_per_pair = max;
        self
    }

    /// Friction cone built from the coefficient.
    #[must_use]
    pub fn friction_cone(&self) -> FrictionCone {
        FrictionCone::new(self.friction_coefficient)
    }

    /// Whether a gap is small enough to produce a contact point.
    #[must_use]
    pub fn is_reported(&self, distance: f64) -> bool {
        distance < self.alarm_distance
    }

    /// Whether a gap is small enough for the contact to be solved.
    #[must_use]
    pub fn is_active(&self, distance: f64) -> bool {
        distance < self.contact_distance
    }

    /// Validate the parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if a distance is negative or non-finite, if the
    /// contact distance exceeds the alarm distance, if friction is negative,
    /// or if the per-pair cap is zero.
    pub fn validate(&self) -> sim_types::Result<()> {
        if !self.alarm_distance.is_finite() || self.alarm_distance < 0.0 {
            return Err(sim_types::SimError::invalid_config(format!(
                "alarm distance must be finite and non-negative, got {}",
                self.alarm_distance
            )));
        }
        if !self.contact_distance.is_finite() || self.contact_distance < 0.0 {
            return Err(sim_types::SimError::invalid_config(format!(
                "contact distance must be finite and non-negative, got {}",
                self.contact_distance
            )));
        }
        if self.contact_distance > self.alarm_distance {
            return Err(sim_types::SimError::invalid_config(format!(
                "contact distance {} exceeds alarm distance {}",
                self.contact_distance, self.alarm_distance
            )));
        }
        if !self.friction_coefficient.is_finite() || self.friction_coefficient < 0.0 {
            return Err(sim_types::SimError::invalid_config(
                "friction coefficient must be finite and non-negative",
            ));
        }
        if self.merge_distance < 0.0 || !self.merge_distance.is_finite() {
            return Err(sim_types::SimError::invalid_config(
                "merge distance must be finite and non-negative",
            ));
        }
        if self.max_contacts_per_pair == 0 {
            return Err(sim_types::SimError::invalid_config(
                "at least one contact per pair must be allowed",
            ));
        }
        Ok(())
    }
}
