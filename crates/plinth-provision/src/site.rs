//! Storage/delivery builder (static websites only)
//!
//! Builds the private bucket, the origin access binding, one delivery
//! distribution per workload with per-folder routing for multi-tenant
//! sites, and the optional certificate + DNS alias pair.

use serde_json::json;
use tracing::info;

use plinth_cloud::{ResourceKind, ResourceRecord};
use plinth_common::spec::StaticSiteSpec;
use plinth_common::Result;

use crate::BuildContext;

/// Cache TTL for rewritten error responses. Kept short so a fixed
/// deployment is not masked by stale error pages.
const ERROR_CACHE_TTL_SECS: u64 = 10;

/// Region delivery certificates must be issued in, regardless of the
/// workload's own region
const CERTIFICATE_REGION: &str = "us-east-1";

/// The resolved storage/delivery topology for one static site
#[derive(Debug)]
pub struct SiteTopology {
    /// The storage bucket record
    pub bucket: ResourceRecord,
    /// The origin access control binding
    pub origin_access: ResourceRecord,
    /// The delivery distribution record
    pub distribution: ResourceRecord,
    /// Domain-validated certificate, present iff a custom domain was
    /// supplied
    pub certificate: Option<ResourceRecord>,
    /// DNS alias record, present iff a custom domain was supplied
    pub dns_record: Option<ResourceRecord>,
}

/// Builds storage and delivery for a static-site workload
pub struct SiteBuilder<'a> {
    ctx: &'a BuildContext<'a>,
}

impl<'a> SiteBuilder<'a> {
    /// Create a builder over the shared context
    pub fn new(ctx: &'a BuildContext<'a>) -> Self {
        Self { ctx }
    }

    /// Build the full storage/delivery topology
    pub async fn build(&self, spec: &StaticSiteSpec) -> Result<SiteTopology> {
        let ctx = self.ctx;
        let meta = ctx.meta;
        info!(
            workload = %meta.identity,
            folders = spec.site_folders.len(),
            "building storage/delivery topology"
        );

        let bucket_fut = ctx.plane.apply(
            ctx.manifest(ResourceKind::Bucket, "storage/bucket", &meta.identity)
                .with_spec(json!({
                    "versioning": true,
                    "serverSideEncryption": "AES256",
                    "blockPublicAccess": true,
                })),
        );
        let certificate_fut = async {
            match meta.domain_pair() {
                None => Ok(None),
                Some((domain, _zone)) => {
                    // delivery certificates are only honored from us-east-1
                    let record = ctx
                        .plane
                        .apply(
                            ctx.manifest(
                                ResourceKind::Certificate,
                                "delivery/certificate",
                                ctx.namer.derive("cert"),
                            )
                            .with_region(CERTIFICATE_REGION)
                            .with_spec(json!({
                                "domainName": domain,
                                "validationMethod": "DNS",
                            })),
                        )
                        .await?;
                    Ok(Some(record))
                }
            }
        };
        let (bucket, certificate) = tokio::try_join!(bucket_fut, certificate_fut)?;

        let origin_access = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::OriginAccessControl,
                    "delivery/origin-access",
                    ctx.namer.derive("oac"),
                )
                .with_spec(json!({
                    "originType": "s3",
                    "signingBehavior": "always",
                    "signingProtocol": "sigv4",
                })),
            )
            .await?;

        let distribution = self
            .build_distribution(spec, &bucket, &origin_access, certificate.as_ref())
            .await?;

        let policy_fut = self.bind_bucket_policy(&bucket, &distribution);
        let dns_fut = self.build_alias(&distribution);
        let (_, dns_record) = tokio::try_join!(policy_fut, dns_fut)?;

        Ok(SiteTopology {
            bucket,
            origin_access,
            distribution,
            certificate,
            dns_record,
        })
    }

    async fn build_distribution(
        &self,
        spec: &StaticSiteSpec,
        bucket: &ResourceRecord,
        origin_access: &ResourceRecord,
        certificate: Option<&ResourceRecord>,
    ) -> Result<ResourceRecord> {
        let ctx = self.ctx;
        let meta = ctx.meta;

        let origin_domain = bucket.require_attr("regionalDomainName")?;
        let oac_id = origin_access.require_attr("originAccessControlId")?;
        let error_page = format!("/{}", spec.error_object);

        let behavior = |path_pattern: Option<&str>| {
            let mut b = json!({
                "targetOrigin": origin_domain,
                "viewerProtocolPolicy": "redirect-to-https",
                "allowedMethods": ["GET", "HEAD"],
                "cachedMethods": ["GET", "HEAD"],
                "compress": true,
            });
            if let Some(pattern) = path_pattern {
                b["pathPattern"] = json!(pattern);
            }
            b
        };

        // one ordered behavior per tenant folder, in declaration order
        let ordered: Vec<_> = spec
            .site_folders
            .iter()
            .map(|folder| behavior(Some(&format!("{folder}/*"))))
            .collect();

        let viewer_certificate = match certificate {
            Some(cert) => json!({ "acmCertificateArn": cert.require_attr("arn")? }),
            None => json!({ "cloudFrontDefaultCertificate": true }),
        };
        let aliases = match meta.domain_pair() {
            Some((domain, _)) => json!([domain]),
            None => json!([]),
        };

        ctx.plane
            .apply(
                ctx.manifest(
                    ResourceKind::Distribution,
                    "delivery/distribution",
                    ctx.namer.derive("cdn"),
                )
                .with_spec(json!({
                    "enabled": true,
                    "defaultRootObject": spec.root_object,
                    "priceClass": spec.delivery_tier.price_class(),
                    "origin": {
                        "domainName": origin_domain,
                        "originAccessControlId": oac_id,
                    },
                    "aliases": aliases,
                    "viewerCertificate": viewer_certificate,
                    "defaultCacheBehavior": behavior(None),
                    "orderedCacheBehaviors": ordered,
                    // storage-level denials surface as 403; both that and
                    // a plain missing object are rewritten to 200 with the
                    // error document so client-side routing keeps working
                    "customErrorResponses": [
                        {
                            "errorCode": 403,
                            "responseCode": 200,
                            "responsePagePath": error_page,
                            "errorCachingMinTtl": ERROR_CACHE_TTL_SECS,
                        },
                        {
                            "errorCode": 404,
                            "responseCode": 200,
                            "responsePagePath": error_page,
                            "errorCachingMinTtl": ERROR_CACHE_TTL_SECS,
                        },
                    ],
                })),
            )
            .await
    }

    /// Grant the delivery service read on the bucket, keyed to this
    /// distribution's identifier rather than a wildcard.
    async fn bind_bucket_policy(
        &self,
        bucket: &ResourceRecord,
        distribution: &ResourceRecord,
    ) -> Result<ResourceRecord> {
        let ctx = self.ctx;
        let bucket_arn = bucket.require_attr("arn")?;
        let distribution_arn = distribution.require_attr("arn")?;

        ctx.plane
            .apply(
                ctx.manifest(
                    ResourceKind::BucketPolicy,
                    "storage/bucket-policy",
                    ctx.namer.derive("bucket-policy"),
                )
                .with_spec(json!({
                    "bucket": bucket.physical_name,
                    "statements": [{
                        "effect": "Allow",
                        "principal": { "service": "cloudfront.amazonaws.com" },
                        "actions": ["s3:GetObject"],
                        "resources": [format!("{bucket_arn}/*")],
                        "condition": {
                            "stringEquals": { "aws:SourceArn": distribution_arn }
                        },
                    }],
                })),
            )
            .await
    }

    async fn build_alias(
        &self,
        distribution: &ResourceRecord,
    ) -> Result<Option<ResourceRecord>> {
        let ctx = self.ctx;
        let Some((domain, zone)) = ctx.meta.domain_pair() else {
            return Ok(None);
        };
        let record = ctx
            .plane
            .apply(
                ctx.manifest(
                    ResourceKind::DnsRecord,
                    "delivery/alias",
                    ctx.namer.derive("alias"),
                )
                .with_spec(json!({
                    "zoneId": zone,
                    "name": domain,
                    "type": "A",
                    "aliasTarget": distribution.require_attr("domainName")?,
                })),
            )
            .await?;
        Ok(Some(record))
    }
}
