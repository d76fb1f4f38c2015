//! The provisioning engine
//!
//! Classifies a workload spec, validates it fail-fast, runs the builders
//! in dependency order and assembles the deployment descriptor.
//! Re-invocation with the same identity reconciles toward the same
//! steady state: no credential is reissued, no secret regenerated, and
//! an unchanged spec yields an identical descriptor.
//!
//! On irrecoverable failure nothing is rolled back — issued resources
//! stay intact and the partial topology is safely re-appliable. Teardown
//! is an explicit decommission pass in reverse dependency order.

use std::time::Duration;

use tracing::{info, warn};

use plinth_cloud::{ControlPlane, ResourceKind, ResourceRecord, SecretStore};
use plinth_common::spec::{ContainerServiceSpec, StaticSiteSpec, WorkloadSpec};
use plinth_common::Result;

use crate::access::AccessBuilder;
use crate::compute::ComputeBuilder;
use crate::descriptor::{self, DeploymentDescriptor};
use crate::network::NetworkBuilder;
use crate::site::SiteBuilder;
use crate::BuildContext;

/// Engine tuning knobs
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Failure domains each subnet tier spreads across
    pub zone_count: usize,
    /// Upper bound for any blocking wait on a prerequisite resource
    pub dependency_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            zone_count: 2,
            dependency_timeout: Duration::from_secs(300),
        }
    }
}

/// Outcome of a decommission pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecommissionReport {
    /// Workload identity that was decommissioned
    pub workload: String,
    /// Logical names of deleted resources, in teardown order
    pub deleted: Vec<String>,
    /// Final snapshots taken for databases that required one
    pub final_snapshots: Vec<String>,
}

/// The workload provisioning engine
pub struct Engine<'a> {
    plane: &'a dyn ControlPlane,
    secrets: &'a dyn SecretStore,
    config: EngineConfig,
}

impl<'a> Engine<'a> {
    /// Create an engine with default configuration
    pub fn new(plane: &'a dyn ControlPlane, secrets: &'a dyn SecretStore) -> Self {
        Self {
            plane,
            secrets,
            config: EngineConfig::default(),
        }
    }

    /// Replace the engine configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Provision (or reconcile) a workload and return its descriptor
    pub async fn provision(&self, spec: &WorkloadSpec) -> Result<DeploymentDescriptor> {
        // fail closed before any resource is touched
        spec.validate()?;
        info!(workload = %spec.identity(), kind = %spec.kind(), "provisioning workload");

        match spec {
            WorkloadSpec::StaticSite(site) => self.provision_site(site).await,
            WorkloadSpec::ContainerService(service) => self.provision_service(service).await,
        }
    }

    async fn provision_site(&self, spec: &StaticSiteSpec) -> Result<DeploymentDescriptor> {
        let ctx = BuildContext::new(self.plane, self.secrets, &spec.meta);

        let topology = SiteBuilder::new(&ctx).build(spec).await?;
        let access = AccessBuilder::new(&ctx)
            .build_site_access(&topology.bucket, &topology.distribution)
            .await?;

        descriptor::assemble_site(spec, &topology, &access)
    }

    async fn provision_service(&self, spec: &ContainerServiceSpec) -> Result<DeploymentDescriptor> {
        let ctx = BuildContext::new(self.plane, self.secrets, &spec.meta);

        let database_port = spec.database.as_ref().map(|db| db.engine.canonical_port());
        let network = NetworkBuilder::new(&ctx)
            .build(spec.container_port, database_port, self.config.zone_count)
            .await?;

        let compute = ComputeBuilder::new(&ctx, self.config.dependency_timeout);
        let foundation = compute.build_foundation(spec, &network).await?;

        // the execution principal must exist before the task definition
        // that references it, and after the secret it reads
        let access = AccessBuilder::new(&ctx)
            .build_execution_access(
                foundation
                    .database
                    .as_ref()
                    .map(|db| db.secret_name.as_str()),
            )
            .await?;

        let surface = compute
            .build_service(
                spec,
                &network,
                &foundation,
                &access.principal.require_attr("arn")?,
            )
            .await?;

        descriptor::assemble_service(spec, &foundation, &surface, &access)
    }

    /// All resources recorded for a workload identity
    pub async fn recorded_resources(&self, identity: &str) -> Result<Vec<ResourceRecord>> {
        self.plane.list(&format!("{identity}/")).await
    }

    /// Decommission a workload: delete its recorded topology in reverse
    /// dependency order and drop its secrets.
    ///
    /// `force` disables deletion protection on protected resources;
    /// without it, a protected database surfaces a conflict and the
    /// topology is left intact up to that point (safe to re-run).
    pub async fn decommission(&self, identity: &str, force: bool) -> Result<DecommissionReport> {
        let mut records = self.recorded_resources(identity).await?;
        if records.is_empty() {
            warn!(workload = %identity, "nothing recorded for workload");
            return Ok(DecommissionReport {
                workload: identity.to_string(),
                ..Default::default()
            });
        }

        records.sort_by(|a, b| {
            b.kind
                .teardown_rank()
                .cmp(&a.kind.teardown_rank())
                .then_with(|| a.logical_name.cmp(&b.logical_name))
        });

        let mut report = DecommissionReport {
            workload: identity.to_string(),
            ..Default::default()
        };
        for record in records {
            if record.kind == ResourceKind::DatabaseInstance {
                let wants_snapshot = record
                    .spec
                    .get("finalSnapshot")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if wants_snapshot {
                    let snapshot = format!("{}-final-snapshot", record.physical_name);
                    info!(snapshot = %snapshot, "taking final snapshot before deletion");
                    report.final_snapshots.push(snapshot);
                }
            }
            self.plane.delete(&record.logical_name, force).await?;
            report.deleted.push(record.logical_name);
        }

        // secret records are owned by the workload and die with it
        self.secrets
            .delete(&format!("{identity}/database/secret"))
            .await?;
        self.secrets
            .delete(&format!("{identity}/access/credential"))
            .await?;

        info!(workload = %identity, deleted = report.deleted.len(), "decommission complete");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_cloud::StatePlane;
    use plinth_common::spec::{DatabaseSpec, WorkloadMeta};
    use plinth_common::Error;

    fn site_spec(identity: &str) -> WorkloadSpec {
        WorkloadSpec::StaticSite(StaticSiteSpec::new(WorkloadMeta::new(identity)))
    }

    #[tokio::test]
    async fn validation_failure_leaves_no_resources() {
        let plane = StatePlane::in_memory();
        let engine = Engine::new(&plane, &plane);

        let mut spec = StaticSiteSpec::new(WorkloadMeta::new("site1"));
        spec.meta.custom_domain = Some("www.example.com".to_string());
        let err = engine
            .provision(&WorkloadSpec::StaticSite(spec))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(plane.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn decommission_tears_down_in_reverse_dependency_order() {
        let plane = StatePlane::in_memory();
        let engine = Engine::new(&plane, &plane);
        engine.provision(&site_spec("site1")).await.unwrap();

        let report = engine.decommission("site1", false).await.unwrap();
        assert!(!report.deleted.is_empty());
        // the distribution goes before the bucket it fronts
        let dist_pos = report
            .deleted
            .iter()
            .position(|n| n == "site1/delivery/distribution")
            .unwrap();
        let bucket_pos = report
            .deleted
            .iter()
            .position(|n| n == "site1/storage/bucket")
            .unwrap();
        assert!(dist_pos < bucket_pos);
        assert!(plane.list("site1/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prod_database_requires_force_and_takes_final_snapshot() {
        let plane = StatePlane::in_memory();
        let engine = Engine::new(&plane, &plane);

        let mut meta = WorkloadMeta::new("todo");
        meta.environment = "prod".to_string();
        let mut spec = ContainerServiceSpec::new(meta, "registry.example.com/todo:1");
        spec.database = Some(DatabaseSpec::default());
        engine
            .provision(&WorkloadSpec::ContainerService(spec))
            .await
            .unwrap();

        let err = engine.decommission("todo", false).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));

        let report = engine.decommission("todo", true).await.unwrap();
        assert_eq!(report.final_snapshots.len(), 1);
        assert!(report.final_snapshots[0].ends_with("-final-snapshot"));
        assert!(plane.list("todo/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dev_database_tears_down_without_snapshot() {
        let plane = StatePlane::in_memory();
        let engine = Engine::new(&plane, &plane);

        let mut spec =
            ContainerServiceSpec::new(WorkloadMeta::new("todo"), "registry.example.com/todo:1");
        spec.database = Some(DatabaseSpec::default());
        engine
            .provision(&WorkloadSpec::ContainerService(spec))
            .await
            .unwrap();

        let report = engine.decommission("todo", false).await.unwrap();
        assert!(report.final_snapshots.is_empty());
        assert!(plane.list("todo/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn decommission_of_unknown_workload_is_empty_report() {
        let plane = StatePlane::in_memory();
        let engine = Engine::new(&plane, &plane);
        let report = engine.decommission("ghost", false).await.unwrap();
        assert!(report.deleted.is_empty());
        assert!(report.final_snapshots.is_empty());
    }
}
