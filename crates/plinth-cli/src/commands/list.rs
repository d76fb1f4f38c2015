//! `plinth list` — enumerate recorded workloads

use std::path::Path;

use plinth_cloud::{ControlPlane, StatePlane};
use plinth_common::{Error, Result, TAG_ENVIRONMENT};

/// List every workload recorded in the state directory
pub async fn run(state_dir: &Path) -> Result<()> {
    if !state_dir.exists() {
        println!("no state directory at {}", state_dir.display());
        return Ok(());
    }

    let mut entries: Vec<_> = std::fs::read_dir(state_dir)
        .map_err(|e| Error::state("list", format!("{}: {e}", state_dir.display())))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    entries.sort();

    if entries.is_empty() {
        println!("no recorded workloads");
        return Ok(());
    }

    for path in entries {
        let Some(identity) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let plane = StatePlane::open(&path)?;
        let records = plane.list("").await?;
        let environment = records
            .first()
            .and_then(|r| r.tags.get(TAG_ENVIRONMENT).cloned())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{identity:<24} {environment:<10} {} resources",
            records.len()
        );
    }
    Ok(())
}
