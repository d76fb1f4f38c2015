//! Naming & tagging service
//!
//! Derives collision-resistant, human-readable resource identifiers and a
//! consistent tag set from workload identity and environment. Names are
//! pure functions of their inputs so repeated resolution during
//! reconciliation lands on the same resource.

use std::collections::BTreeMap;

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::{TAG_ENVIRONMENT, TAG_MANAGED, TAG_MANAGED_VALUE, TAG_NAME, TAG_PROJECT};

/// Provider-safe upper bound for derived names. Long enough for every
/// resource class Plinth creates (the tightest platform limit is 32 for
/// load balancers, which use a short role).
pub const MAX_NAME_LEN: usize = 48;

/// Length of the creation-time disambiguator mixed into names of
/// resources the platform forbids renaming
pub const DISAMBIGUATOR_LEN: usize = 6;

// =============================================================================
// Namer
// =============================================================================

/// Derives resource names for one workload identity
#[derive(Clone, Debug)]
pub struct Namer {
    identity: String,
}

impl Namer {
    /// Create a namer for a workload identity
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }

    /// The workload identity this namer derives from
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Derive the name for a resource role under this identity.
    ///
    /// Stable across repeated calls with identical inputs, and distinct
    /// across roles: `derive("task-exec-role")` can never collide with
    /// `derive("db-secret")` for the same identity.
    pub fn derive(&self, role: &str) -> String {
        clamp(&format!("{}-{}", self.identity, role))
    }

    /// Derive a name mixing in a creation-time disambiguator.
    ///
    /// Used for resources whose platform forbids renaming after creation
    /// (databases, secrets, log groups). The disambiguator is captured
    /// once at creation and must be reused on every subsequent
    /// resolution for that resource; regenerating it would orphan the
    /// live resource.
    pub fn derive_with(&self, role: &str, disambiguator: &str) -> String {
        clamp(&format!("{}-{}-{}", self.identity, role, disambiguator))
    }
}

/// Generate a fresh creation-time disambiguator: lowercase alphanumeric,
/// safe in every name position the engine uses it in.
pub fn disambiguator() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..DISAMBIGUATOR_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Clamp a derived name to the provider-safe length. Names over the limit
/// keep a readable prefix and gain a stable digest suffix so truncation
/// cannot introduce collisions.
fn clamp(name: &str) -> String {
    if name.len() <= MAX_NAME_LEN {
        return name.to_string();
    }
    let digest = Sha256::digest(name.as_bytes());
    let suffix = hex::encode(&digest[..4]);
    let keep = MAX_NAME_LEN - suffix.len() - 1;
    let mut prefix = &name[..keep];
    // never end the kept prefix on a hyphen
    while prefix.ends_with('-') {
        prefix = &prefix[..prefix.len() - 1];
    }
    format!("{prefix}-{suffix}")
}

// =============================================================================
// Tags
// =============================================================================

/// Build the tag set for an engine-managed resource.
///
/// Merges the fixed base (`Managed`, `Project`, `Environment`) with
/// caller-supplied tags. Caller tags win on key collision except for the
/// identity-critical `Name` and `Managed` keys, which the engine owns.
pub fn build_tags(
    identity: &str,
    environment: &str,
    extra: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert(TAG_MANAGED.to_string(), TAG_MANAGED_VALUE.to_string());
    tags.insert(TAG_PROJECT.to_string(), identity.to_string());
    tags.insert(TAG_ENVIRONMENT.to_string(), environment.to_string());

    for (key, value) in extra {
        if key == TAG_NAME || key == TAG_MANAGED {
            continue;
        }
        tags.insert(key.clone(), value.clone());
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_stable() {
        let namer = Namer::new("todo");
        assert_eq!(namer.derive("cluster"), namer.derive("cluster"));
        assert_eq!(namer.derive("cluster"), "todo-cluster");
    }

    #[test]
    fn roles_never_collide() {
        let namer = Namer::new("todo");
        assert_ne!(namer.derive("task-exec-role"), namer.derive("db-secret"));
    }

    #[test]
    fn long_names_are_clamped_with_stable_suffix() {
        let namer = Namer::new("a-very-long-workload-identity-near-the-limit");
        let name = namer.derive("load-balancer-target-group");
        assert!(name.len() <= MAX_NAME_LEN);
        assert_eq!(name, namer.derive("load-balancer-target-group"));
        // distinct long roles keep distinct suffixes
        let other = namer.derive("load-balancer-target-groups");
        assert_ne!(name, other);
    }

    #[test]
    fn disambiguators_are_fresh_and_well_formed() {
        let a = disambiguator();
        let b = disambiguator();
        assert_eq!(a.len(), DISAMBIGUATOR_LEN);
        assert!(a.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        // collisions are possible in principle, vanishingly unlikely here
        assert_ne!(a, b);
    }

    #[test]
    fn caller_tags_win_except_reserved_keys() {
        let mut extra = BTreeMap::new();
        extra.insert("Environment".to_string(), "qa".to_string());
        extra.insert("Team".to_string(), "web".to_string());
        extra.insert("Managed".to_string(), "someone-else".to_string());
        extra.insert("Name".to_string(), "hijack".to_string());

        let tags = build_tags("todo", "dev", &extra);
        assert_eq!(tags.get("Environment").unwrap(), "qa");
        assert_eq!(tags.get("Team").unwrap(), "web");
        assert_eq!(tags.get("Managed").unwrap(), TAG_MANAGED_VALUE);
        assert_eq!(tags.get("Project").unwrap(), "todo");
        assert!(!tags.contains_key("Name"));
    }
}
