//! Log command implementation.

use super::open_ledger;
use crate::error::CliError;
use crate::Format;
use depot_protocol::CommitRecord;
use depot_server::CommitLedger;
use std::fmt::Write;
use std::path::Path;

/// Runs the log command.
pub fn run(data: &Path, project: &str, since: u32, format: Format) -> Result<(), CliError> {
    let ledger = open_ledger(data)?;
    print!("{}", render(&ledger, project, since, format)?);
    Ok(())
}

/// Renders the commits of `project` after `since`.
pub fn render(
    ledger: &CommitLedger,
    project: &str,
    since: u32,
    format: Format,
) -> Result<String, CliError> {
    let records = ledger.range_since(project, since)?;
    match format {
        Format::Json => Ok(serde_json::to_string_pretty(&records)? + "\n"),
        Format::Text => Ok(render_text(&records)),
    }
}

fn render_text(records: &[CommitRecord]) -> String {
    if records.is_empty() {
        return "No commits.\n".to_string();
    }

    let mut out = String::new();
    for record in records {
        let _ = writeln!(out, "commit {}  {}", record.commit_id, record.description);
        for diff in &record.files {
            let _ = writeln!(
                out,
                "    {:<6} {} (v{})",
                diff.operation, diff.file_name, diff.version
            );
        }
    }
    out
}
