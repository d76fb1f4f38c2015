//! Workload specification model
//!
//! A [`WorkloadSpec`] is the immutable input to the provisioning engine.
//! It is a tagged union over the two supported workload kinds; each kind
//! carries the shared [`WorkloadMeta`] plus kind-specific fields. All
//! optional fields have documented defaults so a minimal spec is valid.

mod database;
mod service;
mod site;

pub use database::{DatabaseEngine, DatabaseSpec, StorageBounds};
pub use service::{ContainerServiceSpec, EnvVar, ScalingBounds};
pub use site::{DeliveryTier, StaticSiteSpec};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Default deployment environment
pub const DEFAULT_ENVIRONMENT: &str = "dev";

/// Default provisioning region
pub const DEFAULT_REGION: &str = "us-east-1";

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

// =============================================================================
// Workload kind
// =============================================================================

/// The two workload kinds Plinth provisions
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum WorkloadKind {
    /// Static website served from object storage through a CDN
    StaticSite,
    /// Containerized network service with an optional managed database
    ContainerService,
}

impl std::fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaticSite => f.write_str("StaticSite"),
            Self::ContainerService => f.write_str("ContainerService"),
        }
    }
}

// =============================================================================
// Shared metadata
// =============================================================================

/// Identity, placement and labelling shared by every workload kind
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadMeta {
    /// Workload identity (project/bucket/service name). Seeds every
    /// derived resource name; never mutated by the engine.
    pub identity: String,

    /// Deployment environment tag (e.g. dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Provisioning region
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom domain name for the workload's public endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,

    /// DNS zone identifier for the custom domain. Must be supplied
    /// together with `custom_domain`; either one alone fails validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_zone: Option<String>,

    /// Caller-supplied tags, merged over the engine defaults (caller wins
    /// except on the reserved `Name` and `Managed` keys)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl WorkloadMeta {
    /// Create metadata with defaults for everything but the identity
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            environment: default_environment(),
            region: default_region(),
            custom_domain: None,
            dns_zone: None,
            tags: BTreeMap::new(),
        }
    }

    /// The custom domain paired with its DNS zone, when both are present
    pub fn domain_pair(&self) -> Option<(&str, &str)> {
        match (self.custom_domain.as_deref(), self.dns_zone.as_deref()) {
            (Some(domain), Some(zone)) => Some((domain, zone)),
            _ => None,
        }
    }

    /// True when production safeguards (deletion protection, final
    /// snapshots) apply
    pub fn is_production(&self) -> bool {
        self.environment == crate::PRODUCTION_ENVIRONMENT
    }

    fn validate(&self) -> Result<(), Error> {
        validate_identifier(&self.identity, &self.identity, "identity")?;

        if self.environment.is_empty() {
            return Err(Error::validation_for_field(
                &self.identity,
                "environment",
                "environment must not be empty",
            ));
        }
        if self.region.is_empty() {
            return Err(Error::validation_for_field(
                &self.identity,
                "region",
                "region must not be empty",
            ));
        }

        // The domain and its zone are coupled inputs. Supplying one
        // without the other must fail rather than silently skipping the
        // DNS alias.
        match (&self.custom_domain, &self.dns_zone) {
            (Some(_), None) => {
                return Err(Error::validation_for_field(
                    &self.identity,
                    "dnsZone",
                    "custom domain requires a DNS zone",
                ))
            }
            (None, Some(_)) => {
                return Err(Error::validation_for_field(
                    &self.identity,
                    "customDomain",
                    "DNS zone requires a custom domain",
                ))
            }
            _ => {}
        }

        if let Some(domain) = &self.custom_domain {
            if domain.is_empty() || !domain.contains('.') {
                return Err(Error::validation_for_field(
                    &self.identity,
                    "customDomain",
                    format!("'{domain}' is not a valid domain name"),
                ));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Workload spec
// =============================================================================

/// Declarative workload specification, the immutable engine input
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind")]
pub enum WorkloadSpec {
    /// Static website workload
    StaticSite(StaticSiteSpec),
    /// Containerized service workload
    ContainerService(ContainerServiceSpec),
}

impl WorkloadSpec {
    /// The workload kind tag
    pub fn kind(&self) -> WorkloadKind {
        match self {
            Self::StaticSite(_) => WorkloadKind::StaticSite,
            Self::ContainerService(_) => WorkloadKind::ContainerService,
        }
    }

    /// Shared metadata for any workload kind
    pub fn meta(&self) -> &WorkloadMeta {
        match self {
            Self::StaticSite(s) => &s.meta,
            Self::ContainerService(s) => &s.meta,
        }
    }

    /// Workload identity shorthand
    pub fn identity(&self) -> &str {
        &self.meta().identity
    }

    /// Validate the whole spec. Runs before any resource mutation; a
    /// failure here guarantees no partial topology was created.
    pub fn validate(&self) -> Result<(), Error> {
        self.meta().validate()?;
        match self {
            Self::StaticSite(s) => s.validate(),
            Self::ContainerService(s) => s.validate(),
        }
    }
}

/// Validate a name used to derive resource identifiers: lowercase
/// alphanumerics and hyphens, starting with a letter.
pub(crate) fn validate_identifier(
    workload: &str,
    value: &str,
    field: &str,
) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::validation_for_field(
            workload,
            field,
            format!("{field} must not be empty"),
        ));
    }
    if value.len() > 40 {
        return Err(Error::validation_for_field(
            workload,
            field,
            format!("{field} must be at most 40 characters"),
        ));
    }
    if !value.chars().next().is_some_and(|c| c.is_ascii_lowercase()) {
        return Err(Error::validation_for_field(
            workload,
            field,
            format!("{field} must start with a lowercase letter"),
        ));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(Error::validation_for_field(
            workload,
            field,
            format!("{field} may contain only lowercase letters, digits and hyphens"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site_spec(identity: &str) -> WorkloadSpec {
        WorkloadSpec::StaticSite(StaticSiteSpec::new(WorkloadMeta::new(identity)))
    }

    #[test]
    fn minimal_static_site_is_valid() {
        let spec = site_spec("site1");
        assert!(spec.validate().is_ok());
        assert_eq!(spec.kind(), WorkloadKind::StaticSite);
        assert_eq!(spec.meta().environment, "dev");
        assert_eq!(spec.meta().region, "us-east-1");
    }

    #[test]
    fn domain_without_zone_fails_validation() {
        let mut spec = StaticSiteSpec::new(WorkloadMeta::new("site1"));
        spec.meta.custom_domain = Some("www.example.com".to_string());
        let err = WorkloadSpec::StaticSite(spec).validate().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("DNS zone"));
    }

    #[test]
    fn zone_without_domain_fails_validation() {
        let mut spec = StaticSiteSpec::new(WorkloadMeta::new("site1"));
        spec.meta.dns_zone = Some("Z0123456789".to_string());
        let err = WorkloadSpec::StaticSite(spec).validate().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn uppercase_identity_is_rejected() {
        let spec = site_spec("Site1");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn kind_tag_round_trips_through_serde() {
        let spec = site_spec("site1");
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"kind\":\"StaticSite\""));
        let back: WorkloadSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }

    #[test]
    fn domain_pair_requires_both_inputs() {
        let mut meta = WorkloadMeta::new("site1");
        assert!(meta.domain_pair().is_none());
        meta.custom_domain = Some("www.example.com".to_string());
        assert!(meta.domain_pair().is_none());
        meta.dns_zone = Some("Z0123456789".to_string());
        assert_eq!(
            meta.domain_pair(),
            Some(("www.example.com", "Z0123456789"))
        );
    }
}
