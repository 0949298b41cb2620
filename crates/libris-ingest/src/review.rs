//! Human review of OCR suggestions: audit files → normalization rules.
//!
//! Suggestions become `\b<bad>\b → good` entries in `ocr_artifacts`.
//! Nothing else ever promotes a suggestion into the live table.

use std::path::Path;

use tracing::{debug, info};

use libris_core::Result;

use crate::normalization::{NormalizationTable, RuleCategory};
use crate::ocr::{audit_stamp, AuditRecord};

/// Parse every `ocr_artifacts_*.txt` file in `logs_dir`, oldest first.
pub fn collect_suggestions(logs_dir: &Path) -> Result<Vec<AuditRecord>> {
    if !logs_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<(String, std::path::PathBuf)> = std::fs::read_dir(logs_dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            audit_stamp(&name).map(|stamp| (stamp.to_string(), entry.path()))
        })
        .collect();
    files.sort();

    let mut records = Vec::new();
    for (stamp, path) in files {
        let body = std::fs::read_to_string(&path)?;
        let before = records.len();
        records.extend(body.lines().filter_map(|line| AuditRecord::parse_line(line, &stamp)));
        debug!("{}: {} suggestions", path.display(), records.len() - before);
    }
    Ok(records)
}

/// The rule pattern for a reviewed suggestion.
pub fn rule_pattern(bad: &str) -> String {
    format!(r"\b{}\b", regex::escape(bad))
}

/// Add each record as an OCR-artifact rule. Later records win for the same
/// token. Returns how many rules were added or changed.
pub fn accept_suggestions(table: &mut NormalizationTable, records: &[AuditRecord]) -> Result<usize> {
    let mut changed = 0;
    for record in records {
        if record.bad == record.good || record.good.is_empty() {
            continue;
        }
        if table.add_rule(RuleCategory::OcrArtifacts, &rule_pattern(&record.bad), &record.good)? {
            changed += 1;
        }
    }
    info!("Accepted {changed} of {} suggestions", records.len());
    Ok(changed)
}
