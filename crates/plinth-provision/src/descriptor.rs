//! Deployment descriptor assembly
//!
//! The descriptor is the engine's output: endpoints, resource
//! identifiers, credential references and literal operational command
//! templates with the real identifiers substituted in. Secret values
//! never appear here — only the references needed to retrieve them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use plinth_common::spec::{ContainerServiceSpec, StaticSiteSpec, WorkloadKind};
use plinth_common::Result;

use crate::access::{ExecutionAccess, SiteAccess};
use crate::compute::{ComputeFoundation, ServiceSurface};
use crate::site::SiteTopology;

// =============================================================================
// Descriptor model
// =============================================================================

/// Reference to an issued credential. Carries identifiers only; the
/// secret material stays in the secret store.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRef {
    /// Principal the credential belongs to
    pub principal: String,
    /// Public access key identifier
    pub access_key_id: String,
    /// Secret-store key where the material is retrievable
    pub secret_ref: String,
}

/// A literal operational command with identifiers substituted in. The
/// engine never executes these.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct OperationalCommand {
    /// What the command does
    pub title: String,
    /// The command text
    pub command: String,
}

/// Public URL for one tenant folder of a multi-tenant site
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct FolderEndpoint {
    /// Tenant folder name
    pub folder: String,
    /// Public URL serving that folder
    pub url: String,
}

/// The engine's output for one provisioned workload
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDescriptor {
    /// Workload identity
    pub workload: String,
    /// Workload kind
    pub kind: WorkloadKind,
    /// Deployment environment
    pub environment: String,
    /// Provisioning region
    pub region: String,
    /// Canonical public URL
    pub primary_url: String,
    /// Custom-domain URL, when a domain was supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_domain_url: Option<String>,
    /// Per-folder URLs for multi-tenant sites, in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folder_urls: Vec<FolderEndpoint>,
    /// Resource identifiers by role
    pub resources: BTreeMap<String, String>,
    /// Issued credential references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<CredentialRef>,
    /// Secret-store name of the database connection secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_secret: Option<String>,
    /// Operational command templates
    pub operations: Vec<OperationalCommand>,
}

impl std::fmt::Display for DeploymentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} ({}, {})", self.workload, self.kind, self.environment)?;
        writeln!(f, "  url: {}", self.primary_url)?;
        if let Some(url) = &self.custom_domain_url {
            writeln!(f, "  custom domain: {url}")?;
        }
        for endpoint in &self.folder_urls {
            writeln!(f, "  {}: {}", endpoint.folder, endpoint.url)?;
        }
        for (role, id) in &self.resources {
            writeln!(f, "  {role}: {id}")?;
        }
        for cred in &self.credentials {
            writeln!(
                f,
                "  credential: {} (key {}, secret at {})",
                cred.principal, cred.access_key_id, cred.secret_ref
            )?;
        }
        if let Some(secret) = &self.database_secret {
            writeln!(f, "  database secret: {secret}")?;
        }
        for op in &self.operations {
            writeln!(f, "  # {}", op.title)?;
            writeln!(f, "  {}", op.command)?;
        }
        Ok(())
    }
}

// =============================================================================
// Assembly
// =============================================================================

/// Assemble the descriptor for a static-site workload
pub fn assemble_site(
    spec: &StaticSiteSpec,
    topology: &SiteTopology,
    access: &SiteAccess,
) -> Result<DeploymentDescriptor> {
    let meta = &spec.meta;
    let domain = topology.distribution.require_attr("domainName")?;
    let distribution_id = topology.distribution.require_attr("distributionId")?;
    let bucket = &topology.bucket.physical_name;
    let profile = &access.principal.physical_name;

    let folder_urls: Vec<FolderEndpoint> = spec
        .site_folders
        .iter()
        .map(|folder| FolderEndpoint {
            folder: folder.clone(),
            url: format!("https://{domain}/{folder}/"),
        })
        .collect();

    let mut resources = BTreeMap::new();
    resources.insert("bucket".to_string(), bucket.clone());
    resources.insert("distribution".to_string(), distribution_id.clone());
    resources.insert("distributionDomain".to_string(), domain.clone());

    let mut operations = vec![OperationalCommand {
        title: "Configure the deployment profile".to_string(),
        command: format!("aws configure --profile {profile}"),
    }];
    let sync_targets: Vec<(String, String)> = if spec.site_folders.is_empty() {
        vec![(String::new(), "/*".to_string())]
    } else {
        spec.site_folders
            .iter()
            .map(|folder| (format!("{folder}/"), format!("/{folder}/*")))
            .collect()
    };
    for (prefix, invalidation_path) in sync_targets {
        operations.push(OperationalCommand {
            title: format!("Upload content to {bucket}/{prefix}"),
            command: format!(
                "aws s3 sync ./site/ s3://{bucket}/{prefix} --profile {profile}"
            ),
        });
        operations.push(OperationalCommand {
            title: "Invalidate cached content".to_string(),
            command: format!(
                "aws cloudfront create-invalidation --distribution-id {distribution_id} \
                 --paths \"{invalidation_path}\" --region {}",
                meta.region
            ),
        });
    }

    Ok(DeploymentDescriptor {
        workload: meta.identity.clone(),
        kind: WorkloadKind::StaticSite,
        environment: meta.environment.clone(),
        region: meta.region.clone(),
        primary_url: format!("https://{domain}/"),
        custom_domain_url: meta
            .domain_pair()
            .map(|(custom, _)| format!("https://{custom}/")),
        folder_urls,
        resources,
        credentials: vec![CredentialRef {
            principal: access.credential.principal.clone(),
            access_key_id: access.credential.access_key_id.clone(),
            secret_ref: access.credential_ref.clone(),
        }],
        database_secret: None,
        operations,
    })
}

/// Assemble the descriptor for a container-service workload
pub fn assemble_service(
    spec: &ContainerServiceSpec,
    foundation: &ComputeFoundation,
    surface: &ServiceSurface,
    access: &ExecutionAccess,
) -> Result<DeploymentDescriptor> {
    let meta = &spec.meta;
    let lb_dns = foundation.load_balancer.require_attr("dnsName")?;
    let cluster = &foundation.cluster.physical_name;
    let service = &surface.service.physical_name;
    let log_group = &foundation.log_group.physical_name;

    // HTTPS only exists when a certificate was issued
    let custom_domain_url = match (&foundation.https_listener, meta.custom_domain.as_deref()) {
        (Some(_), Some(domain)) => Some(format!("https://{domain}/")),
        _ => None,
    };

    let mut resources = BTreeMap::new();
    resources.insert("cluster".to_string(), cluster.clone());
    resources.insert("service".to_string(), service.clone());
    resources.insert("loadBalancer".to_string(), lb_dns.clone());
    resources.insert(
        "taskDefinition".to_string(),
        surface.task_definition.require_attr("arn")?,
    );
    resources.insert("logGroup".to_string(), log_group.clone());
    resources.insert(
        "executionRole".to_string(),
        access.principal.physical_name.clone(),
    );
    if let Some(db) = &foundation.database {
        resources.insert("database".to_string(), db.instance.require_attr("address")?);
    }

    let mut operations = vec![
        OperationalCommand {
            title: "Roll out a new image".to_string(),
            command: format!(
                "aws ecs update-service --cluster {cluster} --service {service} \
                 --force-new-deployment --region {}",
                meta.region
            ),
        },
        OperationalCommand {
            title: "Tail service logs".to_string(),
            command: format!("aws logs tail {log_group} --follow --region {}", meta.region),
        },
    ];
    if let Some(db) = &foundation.database {
        operations.push(OperationalCommand {
            title: "Retrieve database credentials".to_string(),
            command: format!(
                "aws secretsmanager get-secret-value --secret-id {} --region {}",
                db.secret_name, meta.region
            ),
        });
    }

    Ok(DeploymentDescriptor {
        workload: meta.identity.clone(),
        kind: WorkloadKind::ContainerService,
        environment: meta.environment.clone(),
        region: meta.region.clone(),
        primary_url: format!("http://{lb_dns}/"),
        custom_domain_url,
        folder_urls: Vec::new(),
        resources,
        credentials: Vec::new(),
        database_secret: foundation.database.as_ref().map(|db| db.secret_name.clone()),
        operations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_display_never_leaks_secret_material() {
        let descriptor = DeploymentDescriptor {
            workload: "site1".to_string(),
            kind: WorkloadKind::StaticSite,
            environment: "dev".to_string(),
            region: "us-east-1".to_string(),
            primary_url: "https://d1234.cloudfront.net/".to_string(),
            custom_domain_url: None,
            folder_urls: Vec::new(),
            resources: BTreeMap::new(),
            credentials: vec![CredentialRef {
                principal: "site1-deployer".to_string(),
                access_key_id: "AKIAEXAMPLE".to_string(),
                secret_ref: "site1/access/credential".to_string(),
            }],
            database_secret: None,
            operations: Vec::new(),
        };
        let rendered = descriptor.to_string();
        assert!(rendered.contains("AKIAEXAMPLE"));
        assert!(rendered.contains("site1/access/credential"));
        // the ref points at the store; the value itself is not present
        assert!(!rendered.to_lowercase().contains("password"));
    }
}
