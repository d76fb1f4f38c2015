//! File-backed deterministic state plane
//!
//! [`StatePlane`] implements [`ControlPlane`] and [`SecretStore`] over a
//! JSON state file, one per workload, under a state directory. Provider
//! attributes (identifiers, addresses, domains) are synthesized as pure
//! digest functions of the physical name, so re-resolution is
//! deterministic and a re-apply converges on byte-identical records.
//!
//! Adoption rules: a resource that exists under the derived logical name
//! but does not carry the engine's `Managed` tag is never adopted — the
//! apply surfaces a conflict. Spec changes update mutable kinds in place
//! and conflict on immutable kinds.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use plinth_common::{Error, Result, TAG_MANAGED, TAG_MANAGED_VALUE, TAG_NAME};

use crate::manifest::{ResourceKind, ResourceManifest, ResourceRecord};
use crate::plane::{ControlPlane, SecretRecord, SecretStore};

/// Synthetic account identifier used in generated ARNs
const ACCOUNT_ID: &str = "123456789012";

/// Region assumed for attribute synthesis when a manifest is global
const FALLBACK_REGION: &str = "us-east-1";

// =============================================================================
// State file
// =============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
struct StateFile {
    #[serde(default)]
    resources: BTreeMap<String, ResourceRecord>,
    #[serde(default)]
    secrets: BTreeMap<String, SecretRecord>,
}

// =============================================================================
// State plane
// =============================================================================

/// Deterministic control plane + secret store over a JSON state file
pub struct StatePlane {
    inner: Mutex<StateFile>,
    path: Option<PathBuf>,
    zone_overrides: BTreeMap<String, Vec<String>>,
}

impl StatePlane {
    /// Create an empty in-memory plane (tests, dry runs)
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(StateFile::default()),
            path: None,
            zone_overrides: BTreeMap::new(),
        }
    }

    /// Open a plane backed by the given state file, loading existing
    /// state when present
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| Error::state("load", format!("{}: {e}", path.display())))?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::state("load", format!("{}: {e}", path.display())))?
        } else {
            StateFile::default()
        };
        debug!(path = %path.display(), "opened state plane");
        Ok(Self {
            inner: Mutex::new(state),
            path: Some(path),
            zone_overrides: BTreeMap::new(),
        })
    }

    /// Override the failure domains reported for a region (tests)
    pub fn with_availability_zones(mut self, region: &str, zones: Vec<String>) -> Self {
        self.zone_overrides.insert(region.to_string(), zones);
        self
    }

    fn persist(&self, state: &StateFile) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::state("persist", format!("{}: {e}", parent.display())))?;
        }
        let raw = serde_json::to_string_pretty(state)?;
        std::fs::write(path, raw)
            .map_err(|e| Error::state("persist", format!("{}: {e}", path.display())))?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StateFile> {
        // a poisoned lock means a panicked writer; the state itself is
        // still consistent because every mutation is written whole
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// =============================================================================
// Attribute synthesis
// =============================================================================

fn digest_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

fn short_id(physical: &str, len: usize) -> String {
    digest_hex(physical)[..len].to_string()
}

/// Synthesize the provider-assigned attributes for a resource as a pure
/// function of its kind, physical name, region and spec.
fn synthesize_attributes(
    kind: ResourceKind,
    physical: &str,
    region: &str,
    spec: &serde_json::Value,
) -> serde_json::Value {
    use serde_json::json;

    let region = if region.is_empty() {
        FALLBACK_REGION
    } else {
        region
    };
    let d = digest_hex(physical);

    match kind {
        ResourceKind::Vpc => json!({ "vpcId": format!("vpc-{}", &d[..12]) }),
        ResourceKind::Subnet => json!({ "subnetId": format!("subnet-{}", &d[..12]) }),
        ResourceKind::InternetGateway => json!({ "gatewayId": format!("igw-{}", &d[..12]) }),
        ResourceKind::NatGateway => json!({ "gatewayId": format!("nat-{}", &d[..12]) }),
        ResourceKind::RouteTable => json!({ "routeTableId": format!("rtb-{}", &d[..12]) }),
        ResourceKind::RouteTableAssociation => {
            json!({ "associationId": format!("rtbassoc-{}", &d[..12]) })
        }
        ResourceKind::SecurityGroup => json!({ "groupId": format!("sg-{}", &d[..12]) }),

        ResourceKind::Bucket => json!({
            "arn": format!("arn:aws:s3:::{physical}"),
            "regionalDomainName": format!("{physical}.s3.{region}.amazonaws.com"),
        }),
        ResourceKind::BucketPolicy => json!({}),
        ResourceKind::OriginAccessControl => {
            json!({ "originAccessControlId": format!("E{}", short_id(physical, 13).to_uppercase()) })
        }
        ResourceKind::Distribution => {
            let id = format!("E{}", short_id(physical, 13).to_uppercase());
            json!({
                "distributionId": id,
                "domainName": format!("d{}.cloudfront.net", &d[..13]),
                "arn": format!("arn:aws:cloudfront::{ACCOUNT_ID}:distribution/{id}"),
            })
        }
        ResourceKind::Certificate => json!({
            "arn": format!("arn:aws:acm:{region}:{ACCOUNT_ID}:certificate/{}", &d[..32]),
        }),
        ResourceKind::DnsRecord => json!({
            "fqdn": spec.get("name").and_then(|v| v.as_str()).unwrap_or(physical),
        }),

        ResourceKind::Cluster => json!({
            "arn": format!("arn:aws:ecs:{region}:{ACCOUNT_ID}:cluster/{physical}"),
        }),
        ResourceKind::LogGroup => json!({
            "arn": format!("arn:aws:logs:{region}:{ACCOUNT_ID}:log-group:{physical}"),
        }),
        ResourceKind::TaskDefinition => json!({
            "arn": format!("arn:aws:ecs:{region}:{ACCOUNT_ID}:task-definition/{physical}:1"),
            "revision": "1",
        }),
        ResourceKind::Service => json!({
            "arn": format!("arn:aws:ecs:{region}:{ACCOUNT_ID}:service/{physical}"),
        }),
        ResourceKind::LoadBalancer => json!({
            "arn": format!(
                "arn:aws:elasticloadbalancing:{region}:{ACCOUNT_ID}:loadbalancer/app/{physical}/{}",
                &d[..16]
            ),
            "dnsName": format!("{physical}-{}.{region}.elb.amazonaws.com", &d[..8]),
        }),
        ResourceKind::TargetGroup => json!({
            "arn": format!(
                "arn:aws:elasticloadbalancing:{region}:{ACCOUNT_ID}:targetgroup/{physical}/{}",
                &d[..16]
            ),
        }),
        ResourceKind::Listener => json!({
            "arn": format!(
                "arn:aws:elasticloadbalancing:{region}:{ACCOUNT_ID}:listener/app/{physical}/{}",
                &d[..16]
            ),
        }),
        ResourceKind::ScalingTarget => json!({
            "resourceId": format!("service/{physical}"),
        }),
        ResourceKind::ScalingPolicy => json!({
            "arn": format!(
                "arn:aws:autoscaling:{region}:{ACCOUNT_ID}:scalingPolicy:{}:policyName/{physical}",
                &d[..8]
            ),
        }),

        ResourceKind::DatabaseSubnetGroup => json!({ "name": physical }),
        ResourceKind::DatabaseInstance => {
            let port = spec.get("port").and_then(|v| v.as_u64()).unwrap_or(5432);
            json!({
                "address": format!("{physical}.{}.{region}.rds.amazonaws.com", &d[..12]),
                "port": port.to_string(),
                "arn": format!("arn:aws:rds:{region}:{ACCOUNT_ID}:db:{physical}"),
            })
        }

        ResourceKind::AccessPrincipal => json!({
            "arn": format!("arn:aws:iam::{ACCOUNT_ID}:user/{physical}"),
            "accessKeyId": format!("AKIA{}", short_id(physical, 16).to_uppercase()),
        }),
        ResourceKind::AccessPolicy => json!({ "policyName": physical }),
        ResourceKind::ExecutionPrincipal => json!({
            "arn": format!("arn:aws:iam::{ACCOUNT_ID}:role/{physical}"),
        }),
    }
}

// =============================================================================
// ControlPlane impl
// =============================================================================

#[async_trait]
impl ControlPlane for StatePlane {
    async fn lookup(&self, logical_name: &str) -> Result<Option<ResourceRecord>> {
        Ok(self.lock().resources.get(logical_name).cloned())
    }

    async fn apply(&self, manifest: ResourceManifest) -> Result<ResourceRecord> {
        let mut state = self.lock();

        if let Some(existing) = state.resources.get(&manifest.logical_name).cloned() {
            if existing.tags.get(TAG_MANAGED).map(String::as_str) != Some(TAG_MANAGED_VALUE) {
                return Err(Error::conflict(
                    &manifest.logical_name,
                    "resource exists but is not engine-managed; refusing to adopt",
                ));
            }
            if existing.kind != manifest.kind {
                return Err(Error::conflict(
                    &manifest.logical_name,
                    format!(
                        "resource exists as {} but was applied as {}",
                        existing.kind, manifest.kind
                    ),
                ));
            }

            if existing.spec == manifest.spec {
                debug!(resource = %manifest.logical_name, "apply is a no-op, adopting record");
                return Ok(existing);
            }

            if manifest.kind.is_immutable() {
                return Err(Error::conflict(
                    &manifest.logical_name,
                    format!(
                        "{} properties cannot change after creation",
                        manifest.kind
                    ),
                ));
            }

            // in-place update: physical name and creation time are sticky
            info!(resource = %manifest.logical_name, "updating resource in place");
            let mut updated = existing;
            updated.spec = manifest.spec;
            updated.region = manifest.region;
            updated.tags = manifest.tags;
            updated
                .tags
                .insert(TAG_NAME.to_string(), updated.physical_name.clone());
            updated.attributes = synthesize_attributes(
                updated.kind,
                &updated.physical_name,
                &updated.region,
                &updated.spec,
            );
            state
                .resources
                .insert(updated.logical_name.clone(), updated.clone());
            self.persist(&state)?;
            return Ok(updated);
        }

        info!(resource = %manifest.logical_name, kind = %manifest.kind, "creating resource");
        let attributes = synthesize_attributes(
            manifest.kind,
            &manifest.physical_name,
            &manifest.region,
            &manifest.spec,
        );
        let mut tags = manifest.tags;
        tags.insert(TAG_NAME.to_string(), manifest.physical_name.clone());
        let record = ResourceRecord {
            kind: manifest.kind,
            logical_name: manifest.logical_name,
            physical_name: manifest.physical_name,
            region: manifest.region,
            tags,
            spec: manifest.spec,
            attributes,
            created_at: Utc::now(),
        };
        state
            .resources
            .insert(record.logical_name.clone(), record.clone());
        self.persist(&state)?;
        Ok(record)
    }

    async fn delete(&self, logical_name: &str, force: bool) -> Result<()> {
        let mut state = self.lock();
        let Some(record) = state.resources.get(logical_name) else {
            warn!(resource = %logical_name, "delete of unknown resource is a no-op");
            return Ok(());
        };
        let protected = record
            .spec
            .get("deletionProtection")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if protected && !force {
            return Err(Error::conflict(
                logical_name,
                "deletion protection is enabled; decommission with force to disable it",
            ));
        }
        info!(resource = %logical_name, "deleting resource");
        state.resources.remove(logical_name);
        self.persist(&state)?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ResourceRecord>> {
        Ok(self
            .lock()
            .resources
            .values()
            .filter(|r| r.logical_name.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn availability_zones(&self, region: &str) -> Vec<String> {
        if let Some(zones) = self.zone_overrides.get(region) {
            return zones.clone();
        }
        let count = match region {
            "us-east-1" => 6,
            "us-west-2" => 4,
            "eu-west-1" | "us-east-2" | "eu-central-1" | "ap-southeast-1" => 3,
            _ => 2,
        };
        (0..count)
            .map(|i| format!("{region}{}", (b'a' + i as u8) as char))
            .collect()
    }
}

// =============================================================================
// SecretStore impl
// =============================================================================

#[async_trait]
impl SecretStore for StatePlane {
    async fn get(&self, owner: &str) -> Result<Option<SecretRecord>> {
        Ok(self.lock().secrets.get(owner).cloned())
    }

    async fn put(&self, owner: &str, name: &str, value: &str) -> Result<SecretRecord> {
        let mut state = self.lock();
        if let Some(existing) = state.secrets.get(owner) {
            if existing.value == value {
                return Ok(existing.clone());
            }
            // a differing re-put would silently break already-distributed
            // credentials; this is the invariant the engine must never hit
            return Err(Error::SecretRegeneration {
                owner: owner.to_string(),
            });
        }
        info!(owner = %owner, name = %name, "storing new secret version");
        let record = SecretRecord {
            owner: owner.to_string(),
            name: name.to_string(),
            value: value.to_string(),
            version: 1,
            created_at: Utc::now(),
        };
        state.secrets.insert(owner.to_string(), record.clone());
        self.persist(&state)?;
        Ok(record)
    }

    async fn delete(&self, owner: &str) -> Result<()> {
        let mut state = self.lock();
        state.secrets.remove(owner);
        self.persist(&state)?;
        Ok(())
    }
}
