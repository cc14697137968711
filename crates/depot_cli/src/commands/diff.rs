//! Diff command implementation.

use super::open_ledger;
use crate::error::CliError;
use crate::Format;
use depot_protocol::{compose, FileDiff};
use depot_server::CommitLedger;
use serde::Serialize;
use std::fmt::Write;
use std::path::Path;

/// Net change a client at `since` would receive.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiffSummary {
    /// Client's commit id.
    pub since: u32,
    /// Newest commit included (equals `since` when nothing is newer).
    pub head: u32,
    /// Net change per file.
    pub files: Vec<FileDiff>,
    /// Files added and deleted within the range.
    pub squashed: Vec<String>,
}

/// Runs the diff command.
pub fn run(data: &Path, project: &str, since: u32, format: Format) -> Result<(), CliError> {
    let ledger = open_ledger(data)?;
    let summary = summarize(&ledger, project, since)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        Format::Text => print!("{}", render_text(&summary)),
    }
    Ok(())
}

/// Composes every commit of `project` after `since`.
pub fn summarize(ledger: &CommitLedger, project: &str, since: u32) -> Result<DiffSummary, CliError> {
    let records = ledger.range_since(project, since)?;
    let composite = compose(&records);
    Ok(DiffSummary {
        since,
        head: records.last().map_or(since, |r| r.commit_id),
        files: composite.to_file_diffs(),
        squashed: composite.squashed().map(str::to_string).collect(),
    })
}

fn render_text(summary: &DiffSummary) -> String {
    if summary.head == summary.since {
        return "No files to download.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "commits {}..={}", summary.since + 1, summary.head);
    for diff in &summary.files {
        let _ = writeln!(out, "  {:<6} {} (v{})", diff.operation, diff.file_name, diff.version);
    }
    for name in &summary.squashed {
        let _ = writeln!(out, "  {:<6} {}", "gone", name);
    }
    out
}
