//! Control-plane abstraction for Plinth
//!
//! The provisioning builders never talk to a cloud provider directly;
//! they speak to the [`ControlPlane`] and [`SecretStore`] traits defined
//! here. Resources are described as untyped [`manifest::ResourceManifest`]s
//! and come back as applied [`manifest::ResourceRecord`]s carrying
//! provider-assigned attributes.
//!
//! [`state::StatePlane`] is the built-in implementation: a deterministic,
//! file-backed plane used for planning, reconciliation and tests. A
//! provider-backed implementation is an external collaborator behind the
//! same traits.

#![deny(missing_docs)]

pub mod manifest;
pub mod plane;
pub mod state;

pub use manifest::{ResourceKind, ResourceManifest, ResourceRecord};
pub use plane::{ControlPlane, SecretRecord, SecretStore};
pub use state::StatePlane;

pub use plinth_common::{Error, Result};
