//! Read-only health check of a topic's metadata database.
//!
//! Verifies the tables and columns the indexer relies on, then gathers
//! row counts and looks for chunks whose document is gone.

use rusqlite::{Connection, OpenFlags};
use tracing::info;

use libris_core::DataPaths;
use libris_store::schema::{REQUIRED_CHUNK_COLUMNS, REQUIRED_DOCUMENT_COLUMNS, REQUIRED_TABLES};

/// Result of a validation run.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub db_valid: bool,
    pub documents: i64,
    pub chunks: i64,
    pub orphaned_chunks: i64,
    pub duplicate_chunk_positions: i64,
    pub rule_table_present: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Validate the topic database under `paths`. The rule table is only
/// checked for presence, and nothing on disk is created or changed.
pub fn validate(paths: &DataPaths) -> ValidationReport {
    let mut report = ValidationReport::default();
    let db_path = paths.metadata_db.as_path();
    let normalization_map = paths.normalization_map.as_path();

    if !db_path.exists() {
        report
            .errors
            .push(format!("Database not found: {}", db_path.display()));
        return report;
    }

    let conn = match Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY) {
        Ok(c) => c,
        Err(e) => {
            report.errors.push(format!("Failed to open database: {}", e));
            return report;
        }
    };

    for table in REQUIRED_TABLES {
        match table_exists(&conn, table) {
            Ok(true) => {}
            Ok(false) => report.errors.push(format!("Missing required table: {}", table)),
            Err(e) => report
                .errors
                .push(format!("Error checking table {}: {}", table, e)),
        }
    }
    if !report.errors.is_empty() {
        return report;
    }

    check_columns(&conn, "documents", REQUIRED_DOCUMENT_COLUMNS, &mut report.errors);
    check_columns(&conn, "chunks", REQUIRED_CHUNK_COLUMNS, &mut report.errors);
    if !report.errors.is_empty() {
        return report;
    }

    report.db_valid = true;
    report.documents = count_rows(&conn, "documents").unwrap_or(0);
    report.chunks = count_rows(&conn, "chunks").unwrap_or(0);

    if let Ok(orphans) = conn.query_row(
        "SELECT COUNT(*) FROM chunks WHERE document_id NOT IN (SELECT id FROM documents)",
        [],
        |row| row.get::<_, i64>(0),
    ) {
        report.orphaned_chunks = orphans;
        if orphans > 0 {
            report.warnings.push(format!("{} orphaned chunks found", orphans));
        }
    }

    if let Ok(dups) = conn.query_row(
        "SELECT COUNT(*) FROM (
             SELECT document_id, chunk_index FROM chunks
             GROUP BY document_id, chunk_index HAVING COUNT(*) > 1
         )",
        [],
        |row| row.get::<_, i64>(0),
    ) {
        report.duplicate_chunk_positions = dups;
        if dups > 0 {
            report
                .warnings
                .push(format!("{} duplicated chunk positions found", dups));
        }
    }

    if let Ok(empty) = conn.query_row(
        "SELECT COUNT(*) FROM documents d
         WHERE NOT EXISTS (SELECT 1 FROM chunks c WHERE c.document_id = d.id)",
        [],
        |row| row.get::<_, i64>(0),
    ) {
        if empty > 0 {
            report
                .warnings
                .push(format!("{} documents have no chunks", empty));
        }
    }

    report.rule_table_present = normalization_map.exists();
    if !report.rule_table_present {
        report.warnings.push(format!(
            "No normalization map at {}; only plain-text files can be indexed",
            normalization_map.display()
        ));
    }

    info!(
        "Validated {}: {} documents, {} chunks",
        db_path.display(),
        report.documents,
        report.chunks
    );
    report
}

/// Print a validation report to stdout.
pub fn print_report(report: &ValidationReport) {
    println!("=== Libris Database Report ===");
    println!();
    println!("Database valid:     {}", if report.db_valid { "YES" } else { "NO" });
    println!("Documents:          {}", report.documents);
    println!("Chunks:             {}", report.chunks);
    println!("Orphaned chunks:    {}", report.orphaned_chunks);
    println!(
        "Normalization map:  {}",
        if report.rule_table_present { "present" } else { "missing" }
    );

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &report.warnings {
            println!("  - {}", w);
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &report.errors {
            println!("  - {}", e);
        }
    }

    println!();
    if report.errors.is_empty() && report.db_valid {
        println!("Status: OK");
    } else {
        println!("Status: INVALID");
    }
}

fn check_columns(conn: &Connection, table: &str, required: &[&str], errors: &mut Vec<String>) {
    let columns = get_column_names(conn, table);
    for col in required {
        if !columns.iter().any(|c| c == col) {
            errors.push(format!("{} table missing column: {}", table, col));
        }
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// Table names come from the schema constants, never from input.
fn get_column_names(conn: &Connection, table: &str) -> Vec<String> {
    let query = format!("PRAGMA table_info({})", table);
    let mut names = Vec::new();
    if let Ok(mut stmt) = conn.prepare(&query) {
        if let Ok(rows) = stmt.query_map([], |row| row.get::<_, String>(1)) {
            names.extend(rows.flatten());
        }
    }
    names
}

fn count_rows(conn: &Connection, table: &str) -> Result<i64, rusqlite::Error> {
    let query = format!("SELECT COUNT(*) FROM {}", table);
    conn.query_row(&query, [], |row| row.get(0))
}
