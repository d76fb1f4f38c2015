//! Resource manifests and applied records
//!
//! A [`ResourceManifest`] is the desired form of one cloud resource: a
//! kind, a stable logical name, a proposed physical name, tags and an
//! untyped spec. Applying a manifest yields a [`ResourceRecord`] with
//! provider-assigned attributes. The spec is carried as
//! `serde_json::Value` so each builder can describe its resources without
//! a typed binding per provider object.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plinth_common::{Error, Result};

// =============================================================================
// Resource kinds
// =============================================================================

/// Every kind of cloud object the engine creates
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    // Network
    /// Virtual network
    Vpc,
    /// Network segment within one availability zone
    Subnet,
    /// Internet gateway for public subnets
    InternetGateway,
    /// NAT gateway for private egress
    NatGateway,
    /// Route table
    RouteTable,
    /// Route table ↔ subnet association
    RouteTableAssociation,
    /// Security group
    SecurityGroup,

    // Storage & delivery
    /// Object storage container
    Bucket,
    /// Resource policy on a bucket
    BucketPolicy,
    /// Origin access control binding storage reads to one distribution
    OriginAccessControl,
    /// Delivery (CDN) distribution
    Distribution,
    /// Domain-validated certificate
    Certificate,
    /// DNS alias record
    DnsRecord,

    // Compute
    /// Container cluster
    Cluster,
    /// Log sink with fixed retention
    LogGroup,
    /// Container task definition
    TaskDefinition,
    /// Long-running container service
    Service,
    /// Load balancer
    LoadBalancer,
    /// Load balancer target group
    TargetGroup,
    /// Load balancer listener
    Listener,
    /// Auto-scaling target
    ScalingTarget,
    /// Auto-scaling tracking policy
    ScalingPolicy,

    // Database
    /// Subnet group for database placement
    DatabaseSubnetGroup,
    /// Managed relational database instance
    DatabaseInstance,

    // Access
    /// Workload access principal (content management)
    AccessPrincipal,
    /// Scoped policy attached to a principal
    AccessPolicy,
    /// Task execution principal
    ExecutionPrincipal,
}

impl ResourceKind {
    /// Kinds whose spec may not change after creation. A re-apply with a
    /// different spec for one of these surfaces a conflict instead of an
    /// in-place update.
    pub fn is_immutable(&self) -> bool {
        matches!(
            self,
            Self::Vpc | Self::Subnet | Self::DatabaseInstance | Self::Certificate
        )
    }

    /// Teardown ordering rank: higher ranks are deleted first so no
    /// resource outlives its dependents.
    pub fn teardown_rank(&self) -> u8 {
        match self {
            Self::ScalingPolicy => 21,
            Self::ScalingTarget => 20,
            Self::Service => 19,
            Self::TaskDefinition => 18,
            Self::Listener => 17,
            Self::TargetGroup => 16,
            Self::LoadBalancer => 15,
            Self::DatabaseInstance => 14,
            Self::DatabaseSubnetGroup => 13,
            Self::DnsRecord => 12,
            Self::Distribution => 11,
            Self::OriginAccessControl => 10,
            Self::BucketPolicy => 9,
            Self::Bucket => 8,
            Self::Certificate => 7,
            Self::AccessPolicy => 6,
            Self::AccessPrincipal => 5,
            Self::ExecutionPrincipal => 5,
            Self::Cluster => 4,
            Self::LogGroup => 4,
            Self::SecurityGroup => 3,
            Self::RouteTableAssociation => 2,
            Self::RouteTable => 2,
            Self::NatGateway => 2,
            Self::InternetGateway => 1,
            Self::Subnet => 1,
            Self::Vpc => 0,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // reuse the serde kebab-case spelling
        let s = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        f.write_str(s.trim_matches('"'))
    }
}

// =============================================================================
// Manifest
// =============================================================================

/// Desired form of one cloud resource
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceManifest {
    /// Resource kind
    pub kind: ResourceKind,
    /// Stable logical name, a pure function of workload identity + role
    pub logical_name: String,
    /// Proposed physical name. The control plane keeps the recorded
    /// physical name on re-apply, so sticky names survive reconciliation.
    pub physical_name: String,
    /// Provisioning region; empty for global resources
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
    /// Tags to place on the resource
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Untyped desired configuration
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub spec: serde_json::Value,
}

impl ResourceManifest {
    /// Create a manifest with an empty spec and no tags
    pub fn new(
        kind: ResourceKind,
        logical_name: impl Into<String>,
        physical_name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            logical_name: logical_name.into(),
            physical_name: physical_name.into(),
            region: String::new(),
            tags: BTreeMap::new(),
            spec: serde_json::Value::Null,
        }
    }

    /// Set the provisioning region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set the desired configuration
    pub fn with_spec(mut self, spec: serde_json::Value) -> Self {
        self.spec = spec;
        self
    }

    /// Set the tags
    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }
}

// =============================================================================
// Applied record
// =============================================================================

/// One applied resource as recorded by the control plane
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    /// Resource kind
    pub kind: ResourceKind,
    /// Stable logical name
    pub logical_name: String,
    /// Physical name as created (sticky across re-applies)
    pub physical_name: String,
    /// Provisioning region; empty for global resources
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
    /// Tags on the resource
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Applied configuration
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub spec: serde_json::Value,
    /// Provider-assigned attributes (identifiers, addresses, domains)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub attributes: serde_json::Value,
    /// Creation time, preserved across re-applies
    pub created_at: DateTime<Utc>,
}

impl ResourceRecord {
    /// A string attribute by key, if assigned
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }

    /// A string attribute by key, or an internal error naming the
    /// resource and the missing key
    pub fn require_attr(&self, key: &str) -> Result<String> {
        self.attr(key).map(str::to_string).ok_or_else(|| {
            Error::internal(
                "attributes",
                format!("resource {} has no attribute '{key}'", self.logical_name),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn manifest_builder_sets_spec_and_tags() {
        let mut tags = BTreeMap::new();
        tags.insert("Project".to_string(), "todo".to_string());
        let m = ResourceManifest::new(ResourceKind::Cluster, "todo/compute/cluster", "todo-cluster")
            .with_spec(json!({"containerInsights": false}))
            .with_tags(tags);
        assert_eq!(m.kind, ResourceKind::Cluster);
        assert_eq!(m.spec["containerInsights"], json!(false));
        assert_eq!(m.tags.get("Project").unwrap(), "todo");
    }

    #[test]
    fn teardown_ranks_respect_dependencies() {
        assert!(ResourceKind::Service.teardown_rank() > ResourceKind::Cluster.teardown_rank());
        assert!(ResourceKind::Distribution.teardown_rank() > ResourceKind::Bucket.teardown_rank());
        assert!(
            ResourceKind::DatabaseInstance.teardown_rank()
                > ResourceKind::DatabaseSubnetGroup.teardown_rank()
        );
        assert_eq!(ResourceKind::Vpc.teardown_rank(), 0);
    }

    #[test]
    fn kind_display_uses_kebab_case() {
        assert_eq!(ResourceKind::DatabaseInstance.to_string(), "database-instance");
        assert_eq!(ResourceKind::Vpc.to_string(), "vpc");
    }
}
