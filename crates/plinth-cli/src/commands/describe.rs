//! `plinth describe` — show a workload's recorded resources

use std::path::Path;

use plinth_cloud::StatePlane;
use plinth_common::Result;
use plinth_provision::Engine;

use crate::state_file;

/// Print the recorded topology of one workload
pub async fn run(state_dir: &Path, identity: &str) -> Result<()> {
    let path = state_file(state_dir, identity);
    if !path.exists() {
        println!("no recorded state for '{identity}'");
        return Ok(());
    }

    let plane = StatePlane::open(path)?;
    let engine = Engine::new(&plane, &plane);
    let records = engine.recorded_resources(identity).await?;
    if records.is_empty() {
        println!("no recorded resources for '{identity}'");
        return Ok(());
    }

    println!("{identity}: {} resources", records.len());
    for record in records {
        println!(
            "  {:<24} {:<40} {}",
            record.kind.to_string(),
            record.logical_name,
            record.physical_name
        );
    }
    Ok(())
}
