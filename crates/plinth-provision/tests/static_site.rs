//! End-to-end provisioning of static-site workloads against the state
//! plane

use plinth_cloud::{ControlPlane, SecretStore, StatePlane};
use plinth_common::spec::{StaticSiteSpec, WorkloadMeta, WorkloadSpec};
use plinth_provision::Engine;

fn site(identity: &str, folders: &[&str]) -> WorkloadSpec {
    let mut spec = StaticSiteSpec::new(WorkloadMeta::new(identity));
    spec.site_folders = folders.iter().map(|s| s.to_string()).collect();
    WorkloadSpec::StaticSite(spec)
}

#[tokio::test]
async fn single_tenant_descriptor_has_exactly_one_url() {
    let plane = StatePlane::in_memory();
    let engine = Engine::new(&plane, &plane);

    let descriptor = engine.provision(&site("site1", &[])).await.unwrap();

    assert!(descriptor.primary_url.starts_with("https://"));
    assert!(descriptor.primary_url.ends_with(".cloudfront.net/"));
    assert!(descriptor.folder_urls.is_empty());
    assert!(descriptor.custom_domain_url.is_none());
}

#[tokio::test]
async fn multi_tenant_site_shares_one_bucket_and_distribution() {
    let plane = StatePlane::in_memory();
    let engine = Engine::new(&plane, &plane);

    let descriptor = engine.provision(&site("portfolio", &["a", "b"])).await.unwrap();

    let records = plane.list("portfolio/").await.unwrap();
    let buckets = records
        .iter()
        .filter(|r| r.logical_name.contains("storage/bucket") && !r.logical_name.contains("policy"))
        .count();
    let distributions = records
        .iter()
        .filter(|r| r.logical_name.contains("delivery/distribution"))
        .count();
    assert_eq!(buckets, 1);
    assert_eq!(distributions, 1);

    let distribution = plane
        .lookup("portfolio/delivery/distribution")
        .await
        .unwrap()
        .unwrap();
    let behaviors = distribution.spec["orderedCacheBehaviors"].as_array().unwrap();
    assert_eq!(behaviors.len(), 2);
    assert_eq!(behaviors[0]["pathPattern"], "a/*");
    assert_eq!(behaviors[1]["pathPattern"], "b/*");

    let folders: Vec<_> = descriptor
        .folder_urls
        .iter()
        .map(|e| e.folder.as_str())
        .collect();
    assert_eq!(folders, vec!["a", "b"]);
    for endpoint in &descriptor.folder_urls {
        assert!(endpoint.url.ends_with(&format!("/{}/", endpoint.folder)));
    }
}

#[tokio::test]
async fn reapply_is_idempotent_and_issues_no_new_credentials() {
    let plane = StatePlane::in_memory();
    let engine = Engine::new(&plane, &plane);
    let spec = site("site1", &["blog"]);

    let first = engine.provision(&spec).await.unwrap();
    let second = engine.provision(&spec).await.unwrap();
    assert_eq!(first, second);

    let credential = SecretStore::get(&plane, "site1/access/credential")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(credential.version, 1);
}

#[tokio::test]
async fn adding_a_tenant_folder_extends_the_existing_distribution() {
    let plane = StatePlane::in_memory();
    let engine = Engine::new(&plane, &plane);

    let first = engine.provision(&site("portfolio", &["a"])).await.unwrap();
    let second = engine
        .provision(&site("portfolio", &["a", "b"]))
        .await
        .unwrap();

    // same distribution, same credential; one more routed folder
    assert_eq!(
        first.resources.get("distribution"),
        second.resources.get("distribution")
    );
    assert_eq!(first.credentials, second.credentials);
    assert_eq!(second.folder_urls.len(), 2);

    let distribution = plane
        .lookup("portfolio/delivery/distribution")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        distribution.spec["orderedCacheBehaviors"]
            .as_array()
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn custom_domain_yields_certificate_alias_and_domain_url() {
    let plane = StatePlane::in_memory();
    let engine = Engine::new(&plane, &plane);

    let mut spec = StaticSiteSpec::new(WorkloadMeta::new("site1"));
    spec.meta.custom_domain = Some("www.example.com".to_string());
    spec.meta.dns_zone = Some("Z0123456789".to_string());

    let descriptor = engine
        .provision(&WorkloadSpec::StaticSite(spec))
        .await
        .unwrap();
    assert_eq!(
        descriptor.custom_domain_url.as_deref(),
        Some("https://www.example.com/")
    );
    assert!(plane
        .lookup("site1/delivery/certificate")
        .await
        .unwrap()
        .is_some());
    assert!(plane.lookup("site1/delivery/alias").await.unwrap().is_some());
}

#[tokio::test]
async fn domain_without_zone_fails_before_any_resource_exists() {
    let plane = StatePlane::in_memory();
    let engine = Engine::new(&plane, &plane);

    let mut spec = StaticSiteSpec::new(WorkloadMeta::new("site1"));
    spec.meta.custom_domain = Some("www.example.com".to_string());

    let err = engine
        .provision(&WorkloadSpec::StaticSite(spec))
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(plane.list("").await.unwrap().is_empty());
    assert!(SecretStore::get(&plane, "site1/access/credential")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn descriptor_embeds_sync_and_invalidation_commands() {
    let plane = StatePlane::in_memory();
    let engine = Engine::new(&plane, &plane);

    let descriptor = engine.provision(&site("portfolio", &["blog"])).await.unwrap();
    let commands: Vec<_> = descriptor.operations.iter().map(|o| o.command.as_str()).collect();

    assert!(commands
        .iter()
        .any(|c| c.contains("aws s3 sync") && c.contains("s3://portfolio/blog/")));
    let distribution_id = descriptor.resources.get("distribution").unwrap();
    assert!(commands.iter().any(|c| {
        c.contains("aws cloudfront create-invalidation")
            && c.contains(distribution_id.as_str())
            && c.contains("\"/blog/*\"")
    }));
}

#[tokio::test]
async fn state_file_reconciliation_survives_process_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("site1.json");
    let spec = site("site1", &["blog"]);

    let first = {
        let plane = StatePlane::open(&path).unwrap();
        let engine = Engine::new(&plane, &plane);
        engine.provision(&spec).await.unwrap()
    };

    let plane = StatePlane::open(&path).unwrap();
    let engine = Engine::new(&plane, &plane);
    let second = engine.provision(&spec).await.unwrap();

    assert_eq!(first, second);
}
