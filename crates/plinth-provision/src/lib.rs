//! Plinth provisioning engine
//!
//! Compiles a declarative [`plinth_common::spec::WorkloadSpec`] into a
//! graph of cloud resources applied through the control-plane seam, and
//! assembles the resulting [`descriptor::DeploymentDescriptor`].
//!
//! Builders are grouped by concern, mirroring the conditional topology:
//!
//! - [`network`] — virtual network for container services
//! - [`site`] — object storage + delivery for static websites
//! - [`compute`] — cluster, load balancing, service, database
//! - [`access`] — least-privilege principals and credentials
//! - [`secrets`] — get-or-create secret flows
//! - [`engine`] — ordering, concurrency, decommission

#![deny(missing_docs)]

pub mod access;
pub mod compute;
pub mod descriptor;
pub mod engine;
pub mod network;
pub mod secrets;
pub mod site;

pub use descriptor::DeploymentDescriptor;
pub use engine::{DecommissionReport, Engine, EngineConfig};

pub use plinth_common::{Error, Result};

use std::collections::BTreeMap;

use plinth_cloud::{ControlPlane, ResourceKind, ResourceManifest, SecretStore};
use plinth_common::naming::{build_tags, Namer};
use plinth_common::spec::WorkloadMeta;

/// Shared context handed to every builder for one provisioning run
pub struct BuildContext<'a> {
    /// Control plane the builders apply manifests through
    pub plane: &'a dyn ControlPlane,
    /// Secret store for credential and database-secret material
    pub secrets: &'a dyn SecretStore,
    /// Namer seeded with the workload identity
    pub namer: Namer,
    /// Workload metadata
    pub meta: &'a WorkloadMeta,
    /// Resolved tag set for every resource this run creates
    pub tags: BTreeMap<String, String>,
}

impl<'a> BuildContext<'a> {
    /// Create a context for one workload
    pub fn new(
        plane: &'a dyn ControlPlane,
        secrets: &'a dyn SecretStore,
        meta: &'a WorkloadMeta,
    ) -> Self {
        Self {
            plane,
            secrets,
            namer: Namer::new(&meta.identity),
            meta,
            tags: build_tags(&meta.identity, &meta.environment, &meta.tags),
        }
    }

    /// Stable logical name for a resource role of this workload
    pub fn logical(&self, role: &str) -> String {
        format!("{}/{}", self.meta.identity, role)
    }

    /// Resolve the physical name for a resource the platform forbids
    /// renaming. The name recorded at creation wins; `propose` only runs
    /// when no record exists yet, so a creation-time disambiguator is
    /// captured once and never regenerated.
    pub async fn sticky_physical(
        &self,
        role: &str,
        propose: impl FnOnce() -> String,
    ) -> plinth_common::Result<String> {
        match self.plane.lookup(&self.logical(role)).await? {
            Some(record) => Ok(record.physical_name),
            None => Ok(propose()),
        }
    }

    /// Start a manifest with this workload's region and tags filled in
    pub fn manifest(
        &self,
        kind: ResourceKind,
        role: &str,
        physical_name: impl Into<String>,
    ) -> ResourceManifest {
        ResourceManifest::new(kind, self.logical(role), physical_name)
            .with_region(&self.meta.region)
            .with_tags(self.tags.clone())
    }
}
