//! Compute builder (container services only)
//!
//! Builds the container cluster, log sink, load-balancer chain and the
//! optional managed database (the foundation), then — once the access
//! principals exist — the task definition, service and auto-scaling
//! surface. Service creation blocks on listener existence; database
//! secret derivation blocks on instance address availability.

use std::time::Duration;

use serde_json::json;
use tracing::info;

use plinth_cloud::{ResourceKind, ResourceRecord};
use plinth_common::naming::disambiguator;
use plinth_common::secret::DatabaseSecret;
use plinth_common::spec::{ContainerServiceSpec, EnvVar};
use plinth_common::Result;

use crate::network::NetworkTopology;
use crate::secrets::{DatabaseSecretSeed, SecretService};
use crate::BuildContext;

/// Retention for the per-service log sink
const LOG_RETENTION_DAYS: u32 = 30;

/// Utilization target shared by both tracking policies
const SCALING_TARGET_PERCENT: f64 = 70.0;

/// Cool-down applied in both scaling directions
const SCALING_COOLDOWN_SECS: u32 = 300;

/// The provisioned database with its derived connection secret
#[derive(Debug)]
pub struct DatabaseTopology {
    /// Subnet group placing the instance in the data subnets
    pub subnet_group: ResourceRecord,
    /// The instance record
    pub instance: ResourceRecord,
    /// Derived connection secret (value lives in the secret store)
    pub secret: DatabaseSecret,
    /// Stored secret name, the reference handed to dependents
    pub secret_name: String,
    /// Secret owner key in the store
    pub secret_owner: String,
}

/// Everything the service surface depends on
#[derive(Debug)]
pub struct ComputeFoundation {
    /// Container cluster
    pub cluster: ResourceRecord,
    /// Log sink with fixed retention
    pub log_group: ResourceRecord,
    /// Load balancer
    pub load_balancer: ResourceRecord,
    /// Target group the service registers into
    pub target_group: ResourceRecord,
    /// Always-present HTTP listener
    pub http_listener: ResourceRecord,
    /// HTTPS listener, present iff a certificate was issued
    pub https_listener: Option<ResourceRecord>,
    /// Certificate for the custom domain, when supplied
    pub certificate: Option<ResourceRecord>,
    /// Database topology, present iff the spec attaches one
    pub database: Option<DatabaseTopology>,
}

/// The running-service surface built on top of the foundation
#[derive(Debug)]
pub struct ServiceSurface {
    /// Task definition
    pub task_definition: ResourceRecord,
    /// Long-running service
    pub service: ResourceRecord,
    /// Auto-scaling target
    pub scaling_target: ResourceRecord,
    /// CPU and memory tracking policies
    pub scaling_policies: Vec<ResourceRecord>,
}

/// Builds compute resources for a container-service workload
pub struct ComputeBuilder<'a> {
    ctx: &'a BuildContext<'a>,
    dependency_timeout: Duration,
}

impl<'a> ComputeBuilder<'a> {
    /// Create a builder; `dependency_timeout` bounds every blocking wait
    /// on a prerequisite resource
    pub fn new(ctx: &'a BuildContext<'a>, dependency_timeout: Duration) -> Self {
        Self {
            ctx,
            dependency_timeout,
        }
    }

    /// Build the foundation: cluster + log sink, the load-balancer chain
    /// and the optional database. The two independent branches run
    /// concurrently; each is strictly ordered internally.
    pub async fn build_foundation(
        &self,
        spec: &ContainerServiceSpec,
        network: &NetworkTopology,
    ) -> Result<ComputeFoundation> {
        let ctx = self.ctx;
        info!(workload = %ctx.meta.identity, "building compute foundation");

        let cluster_fut = ctx.plane.apply(
            ctx.manifest(
                ResourceKind::Cluster,
                "compute/cluster",
                ctx.namer.derive("cluster"),
            )
            .with_spec(json!({ "containerInsights": false })),
        );
        let logs_fut = self.build_log_group();
        let (cluster, log_group) = tokio::try_join!(cluster_fut, logs_fut)?;

        let balancer_fut = self.build_balancer_chain(spec, network);
        let database_fut = self.build_database(spec, network);
        let ((load_balancer, target_group, http_listener, https_listener, certificate), database) =
            tokio::try_join!(balancer_fut, database_fut)?;

        Ok(ComputeFoundation {
            cluster,
            log_group,
            load_balancer,
            target_group,
            http_listener,
            https_listener,
            certificate,
            database,
        })
    }

    async fn build_log_group(&self) -> Result<ResourceRecord> {
        let ctx = self.ctx;
        // log groups cannot be renamed; capture the disambiguated name once
        let physical = ctx
            .sticky_physical("compute/logs", || {
                format!("/ecs/{}", ctx.namer.derive_with("logs", &disambiguator()))
            })
            .await?;
        ctx.plane
            .apply(
                ctx.manifest(ResourceKind::LogGroup, "compute/logs", physical)
                    .with_spec(json!({ "retentionDays": LOG_RETENTION_DAYS })),
            )
            .await
    }

    #[allow(clippy::type_complexity)]
    async fn build_balancer_chain(
        &self,
        spec: &ContainerServiceSpec,
        network: &NetworkTopology,
    ) -> Result<(
        ResourceRecord,
        ResourceRecord,
        ResourceRecord,
        Option<ResourceRecord>,
        Option<ResourceRecord>,
    )> {
        let ctx = self.ctx;

        let certificate = match ctx.meta.domain_pair() {
            None => None,
            Some((domain, _zone)) => Some(
                ctx.plane
                    .apply(
                        ctx.manifest(
                            ResourceKind::Certificate,
                            "compute/certificate",
                            ctx.namer.derive("cert"),
                        )
                        .with_spec(json!({
                            "domainName": domain,
                            "validationMethod": "DNS",
                        })),
                    )
                    .await?,
            ),
        };

        let load_balancer = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::LoadBalancer,
                    "compute/load-balancer",
                    ctx.namer.derive("alb"),
                )
                .with_spec(json!({
                    "type": "application",
                    "scheme": "internet-facing",
                    "subnets": network.public_subnet_ids,
                    "securityGroups": [network.alb_sg_id],
                })),
            )
            .await?;
        let lb_arn = load_balancer.require_attr("arn")?;

        let target_group = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::TargetGroup,
                    "compute/target-group",
                    ctx.namer.derive("tg"),
                )
                .with_spec(json!({
                    "vpcId": network.vpc.attr("vpcId"),
                    "port": spec.container_port,
                    "protocol": "HTTP",
                    "targetType": "ip",
                    "healthCheck": {
                        "path": spec.health_check_path,
                        "matcher": "200-399",
                        "intervalSeconds": 30,
                        "healthyThreshold": 2,
                        "unhealthyThreshold": 3,
                    },
                })),
            )
            .await?;
        let tg_arn = target_group.require_attr("arn")?;

        let http_listener = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::Listener,
                    "compute/listener-http",
                    ctx.namer.derive("http"),
                )
                .with_spec(json!({
                    "loadBalancerArn": lb_arn,
                    "port": 80,
                    "protocol": "HTTP",
                    "defaultAction": { "forward": tg_arn },
                })),
            )
            .await?;

        let https_listener = match &certificate {
            None => None,
            Some(cert) => Some(
                ctx.plane
                    .apply(
                        ctx.manifest(
                            ResourceKind::Listener,
                            "compute/listener-https",
                            ctx.namer.derive("https"),
                        )
                        .with_spec(json!({
                            "loadBalancerArn": lb_arn,
                            "port": 443,
                            "protocol": "HTTPS",
                            "certificateArn": cert.require_attr("arn")?,
                            "defaultAction": { "forward": tg_arn },
                        })),
                    )
                    .await?,
            ),
        };

        Ok((
            load_balancer,
            target_group,
            http_listener,
            https_listener,
            certificate,
        ))
    }

    async fn build_database(
        &self,
        spec: &ContainerServiceSpec,
        network: &NetworkTopology,
    ) -> Result<Option<DatabaseTopology>> {
        let ctx = self.ctx;
        let Some(db) = &spec.database else {
            return Ok(None);
        };
        let Some(db_sg_id) = &network.database_sg_id else {
            return Err(plinth_common::Error::internal(
                "compute",
                "database requested but no database security group was built",
            ));
        };

        let subnet_group = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::DatabaseSubnetGroup,
                    "database/subnet-group",
                    ctx.namer.derive("db-subnets"),
                )
                .with_spec(json!({ "subnetIds": network.data_subnet_ids })),
            )
            .await?;

        // instances cannot be renamed; capture the disambiguated name once
        let physical = ctx
            .sticky_physical("database/instance", || {
                ctx.namer.derive_with("db", &disambiguator())
            })
            .await?;
        let production = ctx.meta.is_production();
        let instance = ctx
            .plane
            .apply(
                ctx.manifest(ResourceKind::DatabaseInstance, "database/instance", physical)
                    .with_spec(json!({
                        "engine": db.engine.as_str(),
                        "engineVersion": db.engine_version,
                        "instanceClass": db.instance_class,
                        "allocatedStorageGib": db.storage_gib.min,
                        "maxAllocatedStorageGib": db.storage_gib.max,
                        "dbName": db.db_name,
                        "username": db.username,
                        "port": db.engine.canonical_port(),
                        "securityGroupId": db_sg_id,
                        "subnetGroup": subnet_group.physical_name,
                        "publiclyAccessible": false,
                        "deletionProtection": production,
                        "finalSnapshot": production,
                    })),
            )
            .await?;

        // secret derivation blocks on the instance address
        let host = ctx
            .plane
            .await_attribute(
                &ctx.logical("database/instance"),
                "address",
                self.dependency_timeout,
            )
            .await?;

        let secret_owner = ctx.logical("database/secret");
        let secrets = SecretService::new(ctx.secrets);
        let (secret, secret_name) = secrets
            .ensure_database_secret(
                &secret_owner,
                &ctx.namer.derive_with("db-secret", &disambiguator()),
                DatabaseSecretSeed {
                    username: &db.username,
                    host: &host,
                    port: db.engine.canonical_port(),
                    db_name: &db.db_name,
                },
            )
            .await?;

        Ok(Some(DatabaseTopology {
            subnet_group,
            instance,
            secret,
            secret_name,
            secret_owner,
        }))
    }

    /// Build the service surface once the execution principal exists.
    /// The service itself blocks on the HTTP listener being live.
    pub async fn build_service(
        &self,
        spec: &ContainerServiceSpec,
        network: &NetworkTopology,
        foundation: &ComputeFoundation,
        execution_role_arn: &str,
    ) -> Result<ServiceSurface> {
        let ctx = self.ctx;
        info!(workload = %ctx.meta.identity, "building service surface");

        let task_definition = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::TaskDefinition,
                    "compute/task-definition",
                    ctx.namer.derive("task"),
                )
                .with_spec(json!({
                    "family": ctx.namer.derive("task"),
                    "cpu": spec.cpu_units.to_string(),
                    "memory": spec.memory_mib.to_string(),
                    "networkMode": "awsvpc",
                    "executionRoleArn": execution_role_arn,
                    "container": {
                        "name": ctx.meta.identity,
                        "image": spec.container_image,
                        "portMappings": [{ "containerPort": spec.container_port }],
                        "environment": env_entries(&self.assemble_environment(spec, foundation)),
                        "secrets": secret_entries(foundation),
                        "logConfiguration": {
                            "logGroup": foundation.log_group.physical_name,
                            "streamPrefix": ctx.meta.identity,
                        },
                    },
                })),
            )
            .await?;

        // no speculative service creation: the listener must be live
        ctx.plane
            .await_attribute(
                &ctx.logical("compute/listener-http"),
                "arn",
                self.dependency_timeout,
            )
            .await?;

        let service = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::Service,
                    "compute/service",
                    ctx.namer.derive("service"),
                )
                .with_spec(json!({
                    "cluster": foundation.cluster.physical_name,
                    "taskDefinition": task_definition.require_attr("arn")?,
                    "desiredCount": spec.desired_count,
                    "launchType": "FARGATE",
                    "networkConfiguration": {
                        "subnets": network.private_subnet_ids,
                        "securityGroups": [network.service_sg_id],
                        "assignPublicIp": false,
                    },
                    "loadBalancer": {
                        "targetGroupArn": foundation.target_group.require_attr("arn")?,
                        "containerName": ctx.meta.identity,
                        "containerPort": spec.container_port,
                    },
                })),
            )
            .await?;

        let scaling_target = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::ScalingTarget,
                    "compute/scaling-target",
                    ctx.namer.derive("scaling"),
                )
                .with_spec(json!({
                    "resourceId": format!(
                        "service/{}/{}",
                        foundation.cluster.physical_name, service.physical_name
                    ),
                    "scalableDimension": "ecs:service:DesiredCount",
                    "minCapacity": spec.scaling_bounds.min,
                    "maxCapacity": spec.scaling_bounds.max,
                })),
            )
            .await?;

        // two independent tracking policies, same target and cool-downs
        let mut scaling_policies = Vec::with_capacity(2);
        for (role, suffix, metric) in [
            (
                "compute/scaling-cpu",
                "scale-cpu",
                "ECSServiceAverageCPUUtilization",
            ),
            (
                "compute/scaling-memory",
                "scale-memory",
                "ECSServiceAverageMemoryUtilization",
            ),
        ] {
            let policy = ctx
                .plane
                .apply(
                    ctx.manifest(ResourceKind::ScalingPolicy, role, ctx.namer.derive(suffix))
                        .with_spec(json!({
                            "policyType": "TargetTrackingScaling",
                            "predefinedMetric": metric,
                            "targetValue": SCALING_TARGET_PERCENT,
                            "scaleInCooldownSeconds": SCALING_COOLDOWN_SECS,
                            "scaleOutCooldownSeconds": SCALING_COOLDOWN_SECS,
                        })),
                )
                .await?;
            scaling_policies.push(policy);
        }

        Ok(ServiceSurface {
            task_definition,
            service,
            scaling_target,
            scaling_policies,
        })
    }

    /// Assemble container environment: caller variables in declaration
    /// order, then — when a database is attached — the flattened
    /// connection variables. Frameworks split on which form they read,
    /// so both the discrete variables and the structured secret
    /// reference are provided.
    fn assemble_environment(
        &self,
        spec: &ContainerServiceSpec,
        foundation: &ComputeFoundation,
    ) -> Vec<EnvVar> {
        let mut env = spec.environment_variables.clone();
        if let (Some(db_topology), Some(db_spec)) = (&foundation.database, &spec.database) {
            let secret = &db_topology.secret;
            let scheme = db_spec.engine.as_str();
            env.push(EnvVar::new("DB_HOST", &secret.host));
            env.push(EnvVar::new("DB_PORT", secret.port.to_string()));
            env.push(EnvVar::new("DB_NAME", &secret.db_name));
            env.push(EnvVar::new("DB_USER", &secret.username));
            env.push(EnvVar::new("DB_PASSWORD", &secret.password));
            env.push(EnvVar::new(
                "DATABASE_URL",
                secret.connection_string(scheme),
            ));
        }
        env
    }
}

fn env_entries(env: &[EnvVar]) -> serde_json::Value {
    json!(env
        .iter()
        .map(|var| json!({ "name": var.name, "value": var.value }))
        .collect::<Vec<_>>())
}

fn secret_entries(foundation: &ComputeFoundation) -> serde_json::Value {
    match &foundation.database {
        Some(db) => json!([{ "name": "DATABASE_SECRET", "valueFrom": db.secret_name }]),
        None => json!([]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_cloud::StatePlane;
    use plinth_common::spec::{ContainerServiceSpec, DatabaseSpec, WorkloadMeta};

    use crate::network::NetworkBuilder;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn service_spec(database: bool) -> ContainerServiceSpec {
        let mut spec =
            ContainerServiceSpec::new(WorkloadMeta::new("todo"), "registry.example.com/todo:1");
        if database {
            spec.database = Some(DatabaseSpec::default());
        }
        spec
    }

    async fn foundation_for(
        plane: &StatePlane,
        spec: &ContainerServiceSpec,
    ) -> (NetworkTopology, ComputeFoundation) {
        let ctx = BuildContext::new(plane, plane, &spec.meta);
        let db_port = spec.database.as_ref().map(|db| db.engine.canonical_port());
        let network = NetworkBuilder::new(&ctx)
            .build(spec.container_port, db_port, 2)
            .await
            .unwrap();
        let foundation = ComputeBuilder::new(&ctx, TIMEOUT)
            .build_foundation(spec, &network)
            .await
            .unwrap();
        (network, foundation)
    }

    #[tokio::test]
    async fn database_secret_matches_instance_address_and_port() {
        let plane = StatePlane::in_memory();
        let spec = service_spec(true);
        let (_, foundation) = foundation_for(&plane, &spec).await;

        let db = foundation.database.unwrap();
        assert_eq!(db.secret.host, db.instance.attr("address").unwrap());
        assert_eq!(db.secret.port.to_string(), db.instance.attr("port").unwrap());
        assert_eq!(db.secret.username, "appuser");
        assert_eq!(db.secret.db_name, "appdb");
    }

    #[tokio::test]
    async fn no_database_means_no_database_shaped_environment() {
        let plane = StatePlane::in_memory();
        let spec = service_spec(false);
        let (network, foundation) = foundation_for(&plane, &spec).await;

        let ctx = BuildContext::new(&plane, &plane, &spec.meta);
        let surface = ComputeBuilder::new(&ctx, TIMEOUT)
            .build_service(&spec, &network, &foundation, "arn:aws:iam::123456789012:role/x")
            .await
            .unwrap();

        let env = surface.task_definition.spec["container"]["environment"]
            .as_array()
            .unwrap()
            .clone();
        assert!(env
            .iter()
            .all(|e| !e["name"].as_str().unwrap().starts_with("DB_")));
        assert!(surface.task_definition.spec["container"]["secrets"]
            .as_array()
            .unwrap()
            .is_empty());
        assert!(foundation.database.is_none());
    }

    #[tokio::test]
    async fn database_injects_flattened_vars_and_secret_reference() {
        let plane = StatePlane::in_memory();
        let mut spec = service_spec(true);
        spec.environment_variables = vec![EnvVar::new("NODE_ENV", "production")];
        let (network, foundation) = foundation_for(&plane, &spec).await;

        let ctx = BuildContext::new(&plane, &plane, &spec.meta);
        let surface = ComputeBuilder::new(&ctx, TIMEOUT)
            .build_service(&spec, &network, &foundation, "arn:aws:iam::123456789012:role/x")
            .await
            .unwrap();

        let env = surface.task_definition.spec["container"]["environment"]
            .as_array()
            .unwrap()
            .clone();
        // caller variables first, connection variables after
        assert_eq!(env[0]["name"], "NODE_ENV");
        let names: Vec<_> = env
            .iter()
            .map(|e| e["name"].as_str().unwrap().to_string())
            .collect();
        for expected in ["DB_HOST", "DB_PORT", "DB_NAME", "DB_USER", "DB_PASSWORD", "DATABASE_URL"]
        {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }

        let secrets = surface.task_definition.spec["container"]["secrets"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(secrets.len(), 1);
        let db = foundation.database.as_ref().unwrap();
        assert_eq!(secrets[0]["valueFrom"].as_str().unwrap(), db.secret_name);
    }

    #[tokio::test]
    async fn production_enables_protection_and_final_snapshot() {
        let plane = StatePlane::in_memory();
        let mut spec = service_spec(true);
        spec.meta.environment = "prod".to_string();
        let (_, foundation) = foundation_for(&plane, &spec).await;

        let db = foundation.database.unwrap();
        assert_eq!(db.instance.spec["deletionProtection"], true);
        assert_eq!(db.instance.spec["finalSnapshot"], true);
    }

    #[tokio::test]
    async fn dev_database_is_unprotected() {
        let plane = StatePlane::in_memory();
        let spec = service_spec(true);
        let (_, foundation) = foundation_for(&plane, &spec).await;

        let db = foundation.database.unwrap();
        assert_eq!(db.instance.spec["deletionProtection"], false);
        assert_eq!(db.instance.spec["finalSnapshot"], false);
    }

    #[tokio::test]
    async fn https_listener_only_with_certificate() {
        let plane = StatePlane::in_memory();
        let spec = service_spec(false);
        let (_, foundation) = foundation_for(&plane, &spec).await;
        assert!(foundation.https_listener.is_none());
        assert!(foundation.certificate.is_none());

        let plane = StatePlane::in_memory();
        let mut spec = service_spec(false);
        spec.meta.custom_domain = Some("api.example.com".to_string());
        spec.meta.dns_zone = Some("Z0123456789".to_string());
        let (_, foundation) = foundation_for(&plane, &spec).await;
        let https = foundation.https_listener.unwrap();
        assert_eq!(https.spec["port"], 443);
        assert_eq!(
            https.spec["certificateArn"].as_str().unwrap(),
            foundation.certificate.unwrap().attr("arn").unwrap()
        );
    }

    #[tokio::test]
    async fn log_group_name_is_sticky_across_reapplies() {
        let plane = StatePlane::in_memory();
        let spec = service_spec(false);
        let (_, first) = foundation_for(&plane, &spec).await;
        let (_, second) = foundation_for(&plane, &spec).await;
        assert_eq!(
            first.log_group.physical_name,
            second.log_group.physical_name
        );
        assert_eq!(first.log_group.spec["retentionDays"], 30);
    }
}
