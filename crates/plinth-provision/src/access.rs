//! Access & credential builder
//!
//! One access principal per workload, scoped to exactly the resources
//! that workload created — never to another tenant's folders or
//! distributions. Container services additionally get an execution
//! principal limited to the platform execution policy plus read access
//! to their own database secret.
//!
//! Reconciliation adopts a previously issued principal and its
//! credential rather than recreating them; the credential's secret
//! material is generated exactly once.

use serde_json::json;
use tracing::info;

use plinth_cloud::{ResourceKind, ResourceRecord};
use plinth_common::secret::Credential;
use plinth_common::Result;

use crate::secrets::SecretService;
use crate::BuildContext;

/// Actions the content-management principal may perform on its bucket
const BUCKET_ACTIONS: [&str; 4] = [
    "s3:PutObject",
    "s3:GetObject",
    "s3:DeleteObject",
    "s3:ListBucket",
];

/// Access principal, policy and credential for a static site
#[derive(Debug)]
pub struct SiteAccess {
    /// The content-management principal
    pub principal: ResourceRecord,
    /// The scoped policy attached to it
    pub policy: ResourceRecord,
    /// The issued credential (secret material lives in the secret store)
    pub credential: Credential,
    /// Secret-store owner key for the credential, the reference placed
    /// in descriptors
    pub credential_ref: String,
}

/// Execution principal and policy for a container service
#[derive(Debug)]
pub struct ExecutionAccess {
    /// The task execution principal
    pub principal: ResourceRecord,
    /// The scoped policy attached to it
    pub policy: ResourceRecord,
}

/// Builds least-privilege principals for one workload
pub struct AccessBuilder<'a> {
    ctx: &'a BuildContext<'a>,
}

impl<'a> AccessBuilder<'a> {
    /// Create a builder over the shared context
    pub fn new(ctx: &'a BuildContext<'a>) -> Self {
        Self { ctx }
    }

    /// Build the content-management principal for a static site, scoped
    /// to its own bucket and its own distribution only.
    pub async fn build_site_access(
        &self,
        bucket: &ResourceRecord,
        distribution: &ResourceRecord,
    ) -> Result<SiteAccess> {
        let ctx = self.ctx;
        info!(workload = %ctx.meta.identity, "building site access principal");

        let principal = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::AccessPrincipal,
                    "access/principal",
                    ctx.namer.derive("deployer"),
                )
                .with_spec(json!({ "path": "/system/" })),
            )
            .await?;

        let bucket_arn = bucket.require_attr("arn")?;
        let policy = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::AccessPolicy,
                    "access/policy",
                    ctx.namer.derive("deployer-policy"),
                )
                .with_spec(json!({
                    "principal": principal.physical_name,
                    "statements": [
                        {
                            "effect": "Allow",
                            "actions": BUCKET_ACTIONS,
                            "resources": [bucket_arn, format!("{bucket_arn}/*")],
                        },
                        {
                            "effect": "Allow",
                            "actions": ["cloudfront:CreateInvalidation"],
                            "resources": [distribution.require_attr("arn")?],
                        },
                    ],
                })),
            )
            .await?;

        let credential_ref = ctx.logical("access/credential");
        let secrets = SecretService::new(ctx.secrets);
        let (credential, _) = secrets
            .ensure_credential(
                &credential_ref,
                &ctx.namer.derive("deployer-credential"),
                &principal.physical_name,
                &principal.require_attr("accessKeyId")?,
            )
            .await?;

        Ok(SiteAccess {
            principal,
            policy,
            credential,
            credential_ref,
        })
    }

    /// Build the task execution principal for a container service.
    /// `database_secret` is the stored secret name when a database is
    /// attached; its absence leaves the policy at the platform execution
    /// statement alone.
    pub async fn build_execution_access(
        &self,
        database_secret: Option<&str>,
    ) -> Result<ExecutionAccess> {
        let ctx = self.ctx;
        info!(workload = %ctx.meta.identity, "building execution principal");

        let principal = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::ExecutionPrincipal,
                    "access/execution-principal",
                    ctx.namer.derive("exec-role"),
                )
                .with_spec(json!({
                    "assumeRolePolicy": {
                        "service": "ecs-tasks.amazonaws.com",
                        "action": "sts:AssumeRole",
                    },
                    "managedPolicies": [
                        "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy"
                    ],
                })),
            )
            .await?;

        let mut statements = Vec::new();
        if let Some(secret_name) = database_secret {
            statements.push(json!({
                "effect": "Allow",
                "actions": ["secretsmanager:GetSecretValue"],
                "resources": [secret_name],
            }));
        }
        let policy = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::AccessPolicy,
                    "access/execution-policy",
                    ctx.namer.derive("exec-policy"),
                )
                .with_spec(json!({
                    "principal": principal.physical_name,
                    "statements": statements,
                })),
            )
            .await?;

        Ok(ExecutionAccess { principal, policy })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_cloud::StatePlane;
    use plinth_common::spec::{StaticSiteSpec, WorkloadMeta};

    use crate::site::SiteBuilder;

    async fn site_access_for(plane: &StatePlane) -> SiteAccess {
        let spec = StaticSiteSpec::new(WorkloadMeta::new("site1"));
        let ctx = BuildContext::new(plane, plane, &spec.meta);
        let topology = SiteBuilder::new(&ctx).build(&spec).await.unwrap();
        AccessBuilder::new(&ctx)
            .build_site_access(&topology.bucket, &topology.distribution)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn policy_is_scoped_to_own_bucket_and_distribution() {
        let plane = StatePlane::in_memory();
        let access = site_access_for(&plane).await;

        let statements = access.policy.spec["statements"].as_array().unwrap().clone();
        assert_eq!(statements.len(), 2);

        let bucket_resources = statements[0]["resources"].as_array().unwrap();
        assert_eq!(bucket_resources[0], "arn:aws:s3:::site1");
        assert_eq!(bucket_resources[1], "arn:aws:s3:::site1/*");

        let invalidation = &statements[1];
        assert_eq!(invalidation["actions"][0], "cloudfront:CreateInvalidation");
        let resources = invalidation["resources"].as_array().unwrap();
        assert_eq!(resources.len(), 1);
        assert!(resources[0]
            .as_str()
            .unwrap()
            .starts_with("arn:aws:cloudfront::"));
    }

    #[tokio::test]
    async fn reapply_adopts_principal_and_keeps_credential() {
        let plane = StatePlane::in_memory();
        let first = site_access_for(&plane).await;
        let second = site_access_for(&plane).await;

        assert_eq!(first.principal, second.principal);
        assert_eq!(first.credential, second.credential);
        assert_eq!(first.credential.access_key_id, second.credential.access_key_id);
    }

    #[tokio::test]
    async fn execution_policy_grants_secret_read_only_when_attached() {
        let plane = StatePlane::in_memory();
        let meta = WorkloadMeta::new("todo");
        let ctx = BuildContext::new(&plane, &plane, &meta);
        let builder = AccessBuilder::new(&ctx);

        let bare = builder.build_execution_access(None).await.unwrap();
        assert!(bare.policy.spec["statements"].as_array().unwrap().is_empty());

        let with_secret = builder
            .build_execution_access(Some("todo-db-secret-a1b2c3"))
            .await
            .unwrap();
        let statements = with_secret.policy.spec["statements"].as_array().unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0]["actions"][0], "secretsmanager:GetSecretValue");
        assert_eq!(statements[0]["resources"][0], "todo-db-secret-a1b2c3");
    }
}
