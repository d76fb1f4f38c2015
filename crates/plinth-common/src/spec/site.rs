//! Static website workload fields

use serde::{Deserialize, Serialize};

use super::{validate_identifier, WorkloadMeta};
use crate::Error;

fn default_root_object() -> String {
    "index.html".to_string()
}

fn default_error_object() -> String {
    "error.html".to_string()
}

// =============================================================================
// Delivery tier
// =============================================================================

/// Cost/geographic class of the delivery distribution
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryTier {
    /// Lowest-cost class: North America and Europe edges only
    #[default]
    Economy,
    /// Adds Asia, Middle East and Africa edges
    Regional,
    /// All edge locations worldwide
    Global,
}

impl DeliveryTier {
    /// The provider's price-class identifier for this tier
    pub fn price_class(&self) -> &'static str {
        match self {
            Self::Economy => "PriceClass_100",
            Self::Regional => "PriceClass_200",
            Self::Global => "PriceClass_All",
        }
    }
}

// =============================================================================
// Static site spec
// =============================================================================

/// Static website workload: object storage behind a delivery
/// distribution, optionally multi-tenant via per-folder routing.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StaticSiteSpec {
    /// Shared workload metadata
    #[serde(flatten)]
    pub meta: WorkloadMeta,

    /// Ordered set of tenant folders sharing the bucket and
    /// distribution. Empty means a single-tenant site served from the
    /// bucket root.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub site_folders: Vec<String>,

    /// Object served for the root path
    #[serde(default = "default_root_object")]
    pub root_object: String,

    /// Object served for rewritten error responses
    #[serde(default = "default_error_object")]
    pub error_object: String,

    /// Cost/geographic class of the distribution
    #[serde(default)]
    pub delivery_tier: DeliveryTier,
}

impl StaticSiteSpec {
    /// Create a single-tenant site spec with default objects and tier
    pub fn new(meta: WorkloadMeta) -> Self {
        Self {
            meta,
            site_folders: Vec::new(),
            root_object: default_root_object(),
            error_object: default_error_object(),
            delivery_tier: DeliveryTier::default(),
        }
    }

    /// True when the site hosts multiple tenant folders
    pub fn is_multi_tenant(&self) -> bool {
        !self.site_folders.is_empty()
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        let workload = &self.meta.identity;

        if self.root_object.is_empty() {
            return Err(Error::validation_for_field(
                workload,
                "rootObject",
                "root object must not be empty",
            ));
        }
        if self.error_object.is_empty() {
            return Err(Error::validation_for_field(
                workload,
                "errorObject",
                "error object must not be empty",
            ));
        }

        let mut seen = std::collections::BTreeSet::new();
        for folder in &self.site_folders {
            validate_identifier(workload, folder, "siteFolders")?;
            if !seen.insert(folder) {
                return Err(Error::validation_for_field(
                    workload,
                    "siteFolders",
                    format!("duplicate site folder '{folder}'"),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_tier_maps_to_price_class() {
        assert_eq!(DeliveryTier::Economy.price_class(), "PriceClass_100");
        assert_eq!(DeliveryTier::Regional.price_class(), "PriceClass_200");
        assert_eq!(DeliveryTier::Global.price_class(), "PriceClass_All");
    }

    #[test]
    fn duplicate_folders_are_rejected() {
        let mut spec = StaticSiteSpec::new(WorkloadMeta::new("site1"));
        spec.site_folders = vec!["blog".to_string(), "blog".to_string()];
        assert!(spec.validate().is_err());
    }

    #[test]
    fn folder_with_slash_is_rejected() {
        let mut spec = StaticSiteSpec::new(WorkloadMeta::new("site1"));
        spec.site_folders = vec!["a/b".to_string()];
        assert!(spec.validate().is_err());
    }

    #[test]
    fn folders_preserve_declaration_order() {
        let json = r#"{
            "identity": "portfolio",
            "siteFolders": ["zeta", "alpha", "mid"]
        }"#;
        let spec: StaticSiteSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.site_folders, vec!["zeta", "alpha", "mid"]);
        assert!(spec.is_multi_tenant());
        assert_eq!(spec.root_object, "index.html");
        assert_eq!(spec.error_object, "error.html");
    }
}
