//! CLI handler for `pqc-scrape normalize`: re-canonicalize a corpus in place.

use crate::cli::output;
use anyhow::{Context, Result};
use pqc_compliance::{load_dataset, normalize_record, save_dataset, ComplianceRecord};
use std::path::Path;

/// Normalize dates and algorithm fields of every record; returns how many changed.
pub fn normalize_records(records: &mut [ComplianceRecord]) -> usize {
    let mut changed = 0;
    for record in records.iter_mut() {
        let normalized = normalize_record(record);
        if normalized != *record {
            *record = normalized;
            changed += 1;
        }
    }
    changed
}

pub async fn run(path: &Path) -> Result<()> {
    let mut records =
        load_dataset(path).with_context(|| format!("loading {}", path.display()))?;
    let changed = normalize_records(&mut records);

    if changed > 0 {
        save_dataset(path, &records).with_context(|| format!("writing {}", path.display()))?;
    }
    tracing::info!("[Normalize] {changed} of {} records updated", records.len());

    if !output::is_quiet() {
        println!(
            "  Normalized {} records in {} ({changed} changed)",
            records.len(),
            path.display()
        );
    }
    if output::is_json() {
        output::print_json(&serde_json::json!({
            "path": path.display().to_string(),
            "records": records.len(),
            "changed": changed,
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pqc_compliance::PqcCoverage;

    #[test]
    fn test_normalize_counts_changes() {
        let mut records = vec![
            ComplianceRecord {
                id: "a".into(),
                date: "2025-01-02".into(),
                pqc_coverage: PqcCoverage::Algorithms("ML-KEM".into()),
                ..Default::default()
            },
            ComplianceRecord {
                id: "b".into(),
                date: "01/02/2025".into(),
                pqc_coverage: PqcCoverage::Algorithms("Dilithium, ML-DSA".into()),
                ..Default::default()
            },
        ];
        assert_eq!(normalize_records(&mut records), 1);
        assert_eq!(records[1].date, "2025-01-02");
        assert_eq!(records[1].pqc_coverage, PqcCoverage::Algorithms("ML-DSA".into()));
        assert_eq!(normalize_records(&mut records), 0);
    }

    #[tokio::test]
    async fn test_run_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        std::fs::write(
            &path,
            r#"[{"id":"x","source":"NIST","date":"March 15, 2024","link":"https://a.test",
                "type":"FIPS 140-3","status":"Active","pqcCoverage":"Kyber",
                "productName":"Module","productCategory":"HSM","vendor":"Acme"}]"#,
        )
        .unwrap();
        run(&path).await.unwrap();
        let records = load_dataset(&path).unwrap();
        assert_eq!(records[0].date, "2024-03-15");
        assert_eq!(records[0].pqc_coverage, PqcCoverage::Algorithms("ML-KEM".into()));
    }
}
