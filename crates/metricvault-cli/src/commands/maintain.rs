//! Commands that change the store: delete, seed-demo, repair-index.

use std::path::Path;

use metricvault_store::MetricsProvider;
use metricvault_sync::{DEMO_PROJECTS, DataOrigin, DemoSource, MetricsSync, QueryCacheConfig};
use tracing::info;

pub fn delete(config: &Path, project: &str, branch: Option<&str>) -> anyhow::Result<()> {
    let (_, store) = super::open(config)?;
    let summary = store.delete_project_data(project, branch)?;

    println!("✓ Deleted {} row(s) of {project}", summary.rows_deleted);
    if summary.metadata_removed > 0 {
        println!("  removed {project} from the project index");
    }
    if summary.truncated {
        println!("  scan hit the result cap; run again to delete the rest");
    }
    Ok(())
}

pub fn seed_demo(config: &Path, days: u32) -> anyhow::Result<()> {
    let (vault, store) = super::open(config)?;
    let sync = MetricsSync::new(
        store,
        DemoSource::new(),
        QueryCacheConfig::from(&vault.cache()),
    );

    let projects: Vec<&str> = DEMO_PROJECTS.iter().map(|(key, _)| *key).collect();
    let report = sync.fetch_metrics(&projects, days, None)?;

    for outcome in &report.projects {
        match &outcome.origin {
            DataOrigin::Failed(reason) => println!("✗ {}: {reason}", outcome.project),
            origin => println!("✓ {}: {} row(s), {origin:?}", outcome.project, outcome.records),
        }
    }
    info!(daily_rows = report.daily.len(), "demo data seeded");
    Ok(())
}

pub fn repair_index(config: &Path) -> anyhow::Result<()> {
    let (_, store) = super::open(config)?;
    store.migration().reset()?;
    let projects = store.list_stored_projects()?;

    println!("✓ Rebuilt project index: {} project(s)", projects.len());
    if projects.truncated {
        println!("  scan hit the result cap; the index may be incomplete");
    }
    Ok(())
}
