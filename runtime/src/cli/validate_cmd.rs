//! CLI handler for `pqc-scrape validate`.

use crate::cli::output;
use anyhow::{bail, Context, Result};
use pqc_compliance::validation::log_summary;
use pqc_compliance::{load_dataset, validate_dataset, ValidationConfig};
use std::path::Path;

/// Validate a persisted corpus. With `strict`, any invalid record is an error.
pub async fn run(path: &Path, strict: bool) -> Result<()> {
    let records = load_dataset(path).with_context(|| format!("loading {}", path.display()))?;
    let summary = validate_dataset(&records, &ValidationConfig::default());
    log_summary(&summary);

    if !output::is_quiet() {
        println!("  Validated {} records in {}", summary.total(), path.display());
        println!("    valid:         {}", summary.valid);
        println!("    invalid:       {}", summary.invalid);
        println!("    with warnings: {}", summary.warnings);
        if output::is_verbose() {
            for d in &summary.details {
                println!("    {:<32} {}", d.id, d.errors.join("; "));
            }
        }
    }
    if output::is_json() {
        output::print_json(&summary);
    }

    if strict && summary.invalid > 0 {
        bail!("{} invalid records", summary.invalid);
    }
    Ok(())
}
