//! `plinth provision` — apply a workload spec

use std::path::Path;

use tracing::info;

use plinth_cloud::StatePlane;
use plinth_common::spec::WorkloadSpec;
use plinth_common::{Error, Result};
use plinth_provision::{Engine, EngineConfig};

use crate::state_file;

/// Load a spec file, provision it and print the descriptor
pub async fn run(state_dir: &Path, spec_path: &Path, zones: usize, json: bool) -> Result<()> {
    let spec = load_spec(spec_path)?;
    // validate before touching the state file so a bad spec leaves no trace
    spec.validate()?;

    let plane = StatePlane::open(state_file(state_dir, spec.identity()))?;
    let engine = Engine::new(&plane, &plane).with_config(EngineConfig {
        zone_count: zones,
        ..EngineConfig::default()
    });

    let descriptor = engine.provision(&spec).await?;
    info!(workload = %descriptor.workload, "workload provisioned");

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
    } else {
        println!("{descriptor}");
    }
    Ok(())
}

/// Parse a workload spec from YAML or JSON
fn load_spec(path: &Path) -> Result<WorkloadSpec> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::state("load", format!("{}: {e}", path.display())))?;
    let spec = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&raw)?
    } else {
        serde_yaml::from_str(&raw)
            .map_err(|e| Error::serialization(format!("{}: {e}", path.display())))?
    };
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_yaml_spec_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.yaml");
        std::fs::write(
            &path,
            "kind: StaticSite\nidentity: portfolio\nsiteFolders:\n  - blog\n  - shop\n",
        )
        .unwrap();

        let spec = load_spec(&path).unwrap();
        assert_eq!(spec.identity(), "portfolio");
        match spec {
            WorkloadSpec::StaticSite(site) => {
                assert_eq!(site.site_folders, vec!["blog", "shop"]);
                assert_eq!(site.root_object, "index.html");
            }
            other => panic!("unexpected kind: {:?}", other.kind()),
        }
    }

    #[test]
    fn loads_json_service_spec() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("todo.json");
        std::fs::write(
            &path,
            r#"{
                "kind": "ContainerService",
                "identity": "todo",
                "containerImage": "registry.example.com/todo:1",
                "database": { "engine": "postgres" }
            }"#,
        )
        .unwrap();

        let spec = load_spec(&path).unwrap();
        match spec {
            WorkloadSpec::ContainerService(service) => {
                assert_eq!(service.container_port, 3000);
                assert!(service.database.is_some());
            }
            other => panic!("unexpected kind: {:?}", other.kind()),
        }
    }
}
