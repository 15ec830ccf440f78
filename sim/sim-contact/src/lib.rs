//! Contact data for the haptic collision pipeline.
//!
//! This crate holds what the narrow phase produces and the constraint
//! assembler consumes:
//!
//! - [`ContactPoint`] - a signed-distance contact with its tangent basis
//! - [`ContactManifold`] - the points of one body pair, with de-duplication
//! - [`ProximityParams`] - alarm/contact distances, friction, per-pair budget
//! - [`FrictionCone`] - Coulomb cone with exact disk projection
//!
//! # Contact Lifecycle
//!
//! ```text
//! narrow phase ──► ContactPoint { distance, active: distance < contact_distance }
//!                        │
//!                        └──► only `active` points become solver rows
//! ```
//!
//! Contacts are never carried across ticks. Anything that wants temporal
//! coherence (warm starting, normal fallback) keys its own cache on
//! [`ContactPoint::sort_key`].
//!
//! # Example
//!
//! ```
//! use sim_contact::{ContactPoint, ProximityParams};
//! use sim_types::BodyId;
//! use nalgebra::{Point3, Vector3};
//!
//! let params = ProximityParams::reference_scene();
//! let contact = ContactPoint::new(
//!     BodyId::new(1),
//!     BodyId::new(2),
//!     Point3::origin(),
//!     Vector3::y(),
//!     0.05,
//!     0,
//! )
//! .classify(&params);
//!
//! assert!(contact.active);
//! assert!(!contact.is_penetrating());
//! ```

#![doc(html_root_url = "https://docs.rs/sim-contact/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::module_name_repetitions
)]

mod contact;
mod friction;
mod params;

pub use contact::{tangent_basis, ContactManifold, ContactPoint};
pub use friction::FrictionCone;
pub use params::ProximityParams;
