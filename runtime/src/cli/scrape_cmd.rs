//! CLI handler for `pqc-scrape scrape`.

use crate::cli::output;
use crate::config::PipelineConfig;
use crate::pipeline::{Pipeline, RunOptions, RunReport, RunStatus};
use anyhow::{bail, Result};
use pqc_compliance::HealthStatus;
use std::path::PathBuf;

/// Run one pipeline pass and report it.
pub async fn run(options: RunOptions, output_path: Option<PathBuf>) -> Result<()> {
    let mut config = PipelineConfig::from_env();
    if let Some(path) = output_path {
        config.output = path;
    }

    let pipeline = Pipeline::with_default_scrapers(config)?;
    let report = pipeline.run(&options).await?;

    if !output::is_quiet() {
        print_report(&report);
    }
    if output::is_json() {
        output::print_json(&report);
    }

    if report.status == RunStatus::Blocked {
        bail!("health check is critical; corpus not published (use --allow-regression to override)");
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    if let (RunStatus::Fresh, Some(hours)) = (report.status, report.age_hours) {
        println!("  Data is fresh ({hours:.1} hours old). Use --force to re-scrape.");
        return;
    }

    println!("  Sources:");
    for s in &report.sources {
        let error = s.error.as_deref().map(|e| format!("  ({e})")).unwrap_or_default();
        println!(
            "    {:<16} {:<10} {:>6} records {:>8} ms{error}",
            s.source.as_str(),
            s.outcome,
            s.record_count,
            s.duration_ms
        );
    }
    println!();

    if let Some(v) = &report.validation {
        println!(
            "  Validation: {} valid, {} invalid, {} with warnings",
            v.valid, v.invalid, v.warnings
        );
    }

    let flagged: Vec<_> = report
        .health
        .iter()
        .filter(|h| h.status != HealthStatus::Healthy)
        .collect();
    if !flagged.is_empty() {
        println!("  Health:");
        for h in flagged {
            println!(
                "    [{:?}] {}: {}",
                h.status,
                h.source,
                h.message.as_deref().unwrap_or("")
            );
        }
    }

    match report.status {
        RunStatus::Published => println!(
            "\n  Saved {} records to {} (was {})",
            report.record_count,
            report.output.display(),
            report.previous_count
        ),
        RunStatus::Blocked => println!("\n  Not published: critical health check"),
        RunStatus::Fresh => {}
    }
}
