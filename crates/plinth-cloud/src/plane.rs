//! Control-plane and secret-store traits
//!
//! Builders depend on these traits only. Operations are synchronous from
//! the caller's point of view (the future resolves when the control
//! plane reaches a stable answer) and idempotent on identical input.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plinth_common::{Error, Result};

use crate::manifest::{ResourceManifest, ResourceRecord};

/// Poll interval used by the default [`ControlPlane::await_attribute`]
/// implementation
const ATTRIBUTE_POLL_INTERVAL: Duration = Duration::from_millis(250);

// =============================================================================
// Control plane
// =============================================================================

/// The cloud control plane the builders execute against.
///
/// `apply` is a get-or-reconcile operation: applying an identical
/// manifest returns the existing record untouched; applying a changed
/// spec updates mutable kinds in place and surfaces a conflict for
/// immutable ones. Resources that exist but are not engine-managed are
/// never adopted.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Look up a resource by logical name
    async fn lookup(&self, logical_name: &str) -> Result<Option<ResourceRecord>>;

    /// Apply a manifest, creating or reconciling the resource
    async fn apply(&self, manifest: ResourceManifest) -> Result<ResourceRecord>;

    /// Delete a resource. Refuses resources with deletion protection
    /// unless `force` is set, which disables the protection first (the
    /// provider equivalent of a modify-then-delete).
    async fn delete(&self, logical_name: &str, force: bool) -> Result<()>;

    /// List all records whose logical name starts with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<ResourceRecord>>;

    /// The failure domains available in a region, in provisioning order
    fn availability_zones(&self, region: &str) -> Vec<String>;

    /// Block until the named resource exposes the given attribute, or
    /// fail with a dependency timeout naming the stuck resource.
    ///
    /// Resource creation can be slow (seconds to minutes for network and
    /// database resources); dependents call this instead of proceeding
    /// speculatively.
    async fn await_attribute(
        &self,
        logical_name: &str,
        key: &str,
        timeout: Duration,
    ) -> Result<String> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(record) = self.lookup(logical_name).await? {
                if let Some(value) = record.attr(key) {
                    return Ok(value.to_string());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::timeout(
                    logical_name,
                    timeout.as_secs(),
                    format!("attribute '{key}' not assigned"),
                ));
            }
            tokio::time::sleep(ATTRIBUTE_POLL_INTERVAL).await;
        }
    }
}

// =============================================================================
// Secret store
// =============================================================================

/// A stored secret with its version record
#[derive(Clone, Deserialize, Serialize, PartialEq)]
pub struct SecretRecord {
    /// Owner identity the secret belongs to, exclusively
    pub owner: String,
    /// Physical secret name in the store
    pub name: String,
    /// Secret payload (JSON for structured secrets)
    pub value: String,
    /// Version counter, starting at 1
    pub version: u32,
    /// Creation time of the current version
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRecord")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("version", &self.version)
            .finish()
    }
}

/// Managed secret store keyed by owner identity.
///
/// `put` is first-write-wins: an existing owner's value is never
/// overwritten. A `put` that would replace stored material with
/// different material is the secret-regeneration invariant violation and
/// surfaces as an error; it is a programming defect when observed.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the secret owned by `owner`, if stored
    async fn get(&self, owner: &str) -> Result<Option<SecretRecord>>;

    /// Store a secret for `owner`. Returns the existing record untouched
    /// when one with identical material is already stored.
    async fn put(&self, owner: &str, name: &str, value: &str) -> Result<SecretRecord>;

    /// Remove the secret owned by `owner`
    async fn delete(&self, owner: &str) -> Result<()>;
}
