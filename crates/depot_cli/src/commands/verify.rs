//! Verify command implementation.

use super::open_ledger;
use crate::error::CliError;
use depot_protocol::compose;
use depot_server::{CommitLedger, ProjectTree, ServerConfig};
use std::path::Path;

/// Verification result for one project.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of commits checked.
    pub commits: usize,
    /// Number of files checked against the tree.
    pub files_checked: usize,
    /// Problems found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(data: &Path, project: Option<&str>) -> Result<(), CliError> {
    println!("Verifying depot data at {}", data.display());
    println!();

    let ledger = open_ledger(data)?;
    let config = ServerConfig::new(data);
    let projects = match project {
        Some(name) => vec![name.to_string()],
        None => ledger.projects()?,
    };

    let mut problems = 0;
    for name in &projects {
        let result = verify_project(&ledger, &config, name);
        print_result(name, &result);
        problems += result.errors.len();
    }

    println!();
    if problems == 0 {
        println!("✓ {} project(s) verified", projects.len());
        Ok(())
    } else {
        println!("✗ Verification failed");
        Err(CliError::Verification(problems))
    }
}

/// Checks one project's history and its tree.
///
/// Ids must be contiguous, file versions must increase, and every file the
/// history says exists must be in the tree (and deleted ones must not).
pub fn verify_project(ledger: &CommitLedger, config: &ServerConfig, project: &str) -> VerifyResult {
    let mut result = VerifyResult::default();

    match ledger.verify(project) {
        Ok(commits) => result.commits = commits,
        Err(e) => {
            result.errors.push(e.to_string());
            return result;
        }
    }

    let records = match ledger.range_since(project, 0) {
        Ok(records) => records,
        Err(e) => {
            result.errors.push(e.to_string());
            return result;
        }
    };
    let tree = match ProjectTree::open(config.project_dir(project)) {
        Ok(tree) => tree,
        Err(e) => {
            result.errors.push(format!("cannot open tree: {e}"));
            return result;
        }
    };

    let composite = compose(&records);
    for (name, change) in composite.iter() {
        result.files_checked += 1;
        let present = tree.path_of(name).is_some_and(|p| p.is_file());
        if present != change.operation.leaves_file() {
            result.errors.push(format!(
                "{name}: ledger says {} (v{}) but file is {}",
                change.operation,
                change.version,
                if present { "present" } else { "missing" }
            ));
        }
    }
    for name in composite.squashed() {
        result.files_checked += 1;
        if tree.path_of(name).is_some_and(|p| p.exists()) {
            result.errors.push(format!("{name}: deleted in ledger but present in tree"));
        }
    }

    result
}

fn print_result(project: &str, result: &VerifyResult) {
    let mark = if result.is_ok() { "✓" } else { "✗" };
    println!(
        "{mark} {project}: {} commit(s), {} file(s) checked",
        result.commits, result.files_checked
    );
    for error in &result.errors {
        println!("    {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_protocol::{Commit, FileDiff};
    use depot_storage::InMemoryStore;
    use std::fs;
    use std::sync::Arc;

    #[test]
    fn consistent_project_passes() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new(dir.path());
        let ledger = CommitLedger::new(Arc::new(InMemoryStore::new()));

        ledger
            .append("demo", &Commit::new("c1", vec![FileDiff::add("a.txt", 1), FileDiff::add("b", 1)]))
            .unwrap();
        ledger
            .append("demo", &Commit::new("c2", vec![FileDiff::delete("b", 2)]))
            .unwrap();
        fs::create_dir_all(config.project_dir("demo")).unwrap();
        fs::write(config.project_dir("demo").join("a.txt"), "a").unwrap();

        let result = verify_project(&ledger, &config, "demo");
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.commits, 2);
        assert_eq!(result.files_checked, 2);
    }

    #[test]
    fn tree_drift_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new(dir.path());
        let ledger = CommitLedger::new(Arc::new(InMemoryStore::new()));

        ledger
            .append("demo", &Commit::new("c1", vec![FileDiff::add("a.txt", 1)]))
            .unwrap();

        let result = verify_project(&ledger, &config, "demo");
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("missing"));
    }

    #[test]
    fn version_regression_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new(dir.path());
        let ledger = CommitLedger::new(Arc::new(InMemoryStore::new()));

        ledger
            .append("demo", &Commit::new("c1", vec![FileDiff::delete("a", 3)]))
            .unwrap();
        ledger
            .append("demo", &Commit::new("c2", vec![FileDiff::delete("a", 2)]))
            .unwrap();

        let result = verify_project(&ledger, &config, "demo");
        assert!(!result.is_ok());
        assert!(result.errors[0].contains("does not advance"));
    }
}
