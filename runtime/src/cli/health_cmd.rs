//! CLI handler for `pqc-scrape health`: compare two corpus snapshots.

use crate::cli::output;
use anyhow::{bail, Context, Result};
use pqc_compliance::health::log_health_checks;
use pqc_compliance::{check_record_counts, load_dataset, HealthThresholds};
use std::path::Path;

/// Exits non-zero when any source is critical, so CI can gate a publish step.
pub async fn run(current: &Path, previous: &Path) -> Result<()> {
    let current_records =
        load_dataset(current).with_context(|| format!("loading {}", current.display()))?;
    let previous_records =
        load_dataset(previous).with_context(|| format!("loading {}", previous.display()))?;

    let results = check_record_counts(
        &current_records,
        &previous_records,
        &HealthThresholds::default(),
    );
    let critical = log_health_checks(&results);

    if !output::is_quiet() {
        println!("  {:<16} {:>8} {:>8}  status", "source", "now", "before");
        for r in &results {
            println!(
                "  {:<16} {:>8} {:>8}  {:?}{}",
                r.source.as_str(),
                r.record_count,
                r.previous_count,
                r.status,
                r.message
                    .as_deref()
                    .map(|m| format!(": {m}"))
                    .unwrap_or_default()
            );
        }
    }
    if output::is_json() {
        output::print_json(&serde_json::json!({
            "critical": critical,
            "results": results,
        }));
    }

    if critical {
        bail!("critical health check");
    }
    Ok(())
}
