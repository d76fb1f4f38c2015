//! `plinth decommission` — tear down a workload

use std::path::Path;

use tracing::info;

use plinth_cloud::StatePlane;
use plinth_common::{Error, Result};
use plinth_provision::Engine;

use crate::state_file;

/// Decommission one workload and remove its state file once empty
pub async fn run(state_dir: &Path, identity: &str, force: bool) -> Result<()> {
    let path = state_file(state_dir, identity);
    if !path.exists() {
        println!("no recorded state for '{identity}'");
        return Ok(());
    }

    let plane = StatePlane::open(&path)?;
    let engine = Engine::new(&plane, &plane);
    let report = engine.decommission(identity, force).await?;

    for name in &report.deleted {
        println!("deleted {name}");
    }
    for snapshot in &report.final_snapshots {
        println!("final snapshot: {snapshot}");
    }

    std::fs::remove_file(&path)
        .map_err(|e| Error::state("cleanup", format!("{}: {e}", path.display())))?;
    info!(workload = %identity, "workload decommissioned");
    Ok(())
}
