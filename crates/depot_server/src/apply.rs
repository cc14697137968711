//! Transactional application of a commit to a project tree.
//!
//! Every change to the tree is preceded by an undo entry in a journal kept
//! in a private scratch directory. Rolling back replays the journal newest
//! first, so a commit that turned a file into a directory is undone
//! directory first and file second. The returned [`ApplyGuard`] either
//! commits (discarding the journal) or rolls back. A guard dropped without a
//! decision rolls back.
//!
//! Journal entries and file backups reach the disk before the change they
//! cover. A process that dies mid-apply leaves its scratch directory behind
//! and [`recover_pending`] settles it on the next start: the apply is undone
//! unless the ledger already holds its commit.
//!
//! ```text
//! <scratch>/<uuid>/
//! ├─ journal    # intent line, then one undo entry per line
//! ├─ 0          # bytes of the first file overwritten or deleted
//! └─ 1
//! ```

use crate::error::{ApplyError, ServerResult};
use crate::ledger::CommitLedger;
use crate::tree::ProjectTree;
use depot_protocol::{Archive, Commit, DiffType};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const JOURNAL_FILE: &str = "journal";

/// The commit an apply is performed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApplyIntent {
    /// Project whose tree is changed.
    pub project: String,
    /// Id the commit will be recorded under.
    pub commit_id: u32,
}

impl ApplyIntent {
    /// Creates an intent.
    pub fn new(project: impl Into<String>, commit_id: u32) -> Self {
        Self {
            project: project.into(),
            commit_id,
        }
    }
}

/// One reversible change to the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Undo {
    /// A file was overwritten or deleted; its old bytes are in `backup`.
    Restore { path: PathBuf, backup: String },
    /// A file was written where none existed.
    Remove { path: PathBuf },
    /// A directory was created.
    RemoveDir { path: PathBuf },
    /// An empty directory was removed.
    RecreateDir { path: PathBuf },
}

impl Undo {
    fn path(&self) -> &Path {
        match self {
            Undo::Restore { path, .. }
            | Undo::Remove { path }
            | Undo::RemoveDir { path }
            | Undo::RecreateDir { path } => path,
        }
    }

    fn touches_file(&self) -> bool {
        matches!(self, Undo::Restore { .. } | Undo::Remove { .. })
    }

    /// Reverts the change. Safe to repeat.
    fn revert(&self, scratch: &Path) -> io::Result<()> {
        match self {
            Undo::Restore { path, backup } => fs::copy(scratch.join(backup), path).map(|_| ()),
            Undo::Remove { path } => ignore_kind(fs::remove_file(path), io::ErrorKind::NotFound),
            Undo::RemoveDir { path } => ignore_kind(fs::remove_dir(path), io::ErrorKind::NotFound),
            Undo::RecreateDir { path } => {
                ignore_kind(fs::create_dir(path), io::ErrorKind::AlreadyExists)
            }
        }
    }
}

fn ignore_kind(result: io::Result<()>, kind: io::ErrorKind) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == kind => Ok(()),
        other => other,
    }
}

/// Reverts `entries` newest first, continuing past failures.
///
/// Returns one description per failed entry.
fn revert_all(scratch: &Path, entries: &[Undo]) -> Vec<String> {
    entries
        .iter()
        .rev()
        .filter_map(|undo| {
            undo.revert(scratch)
                .err()
                .map(|e| format!("{}: {e}", undo.path().display()))
        })
        .collect()
}

/// Append-only undo journal of one apply, one JSON document per line.
#[derive(Debug)]
struct Journal {
    file: File,
}

impl Journal {
    fn create(dir: &Path, intent: &ApplyIntent) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(JOURNAL_FILE))?;
        let mut journal = Self { file };
        journal.append(intent)?;
        Ok(journal)
    }

    fn append<T: Serialize>(&mut self, entry: &T) -> io::Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_data()
    }
}

/// Reads the journal in `dir`.
///
/// Returns `None` if not even the intent reached the disk. A torn last
/// entry is dropped; the change it covered had not started.
fn read_journal(dir: &Path) -> io::Result<Option<(ApplyIntent, Vec<Undo>)>> {
    let bytes = match fs::read(dir.join(JOURNAL_FILE)) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut lines = bytes.split(|&b| b == b'\n');
    let Some(intent) = lines
        .next()
        .and_then(|line| serde_json::from_slice::<ApplyIntent>(line).ok())
    else {
        return Ok(None);
    };
    let entries: Vec<Undo> = lines
        .map_while(|line| serde_json::from_slice(line).ok())
        .collect();
    Ok(Some((intent, entries)))
}

/// Pending result of [`apply_commit`].
///
/// Holds the undo journal until [`ApplyGuard::commit`] or
/// [`ApplyGuard::rollback`] is called.
#[derive(Debug)]
#[must_use = "dropping an ApplyGuard rolls the apply back"]
pub struct ApplyGuard {
    scratch: PathBuf,
    journal: Journal,
    entries: Vec<Undo>,
    backups: usize,
    finished: bool,
}

impl ApplyGuard {
    fn begin(scratch_root: &Path, intent: &ApplyIntent) -> Result<Self, ApplyError> {
        let scratch = scratch_root.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&scratch).map_err(|e| ApplyError::io(&scratch, e))?;

        match Journal::create(&scratch, intent) {
            Ok(journal) => Ok(Self {
                scratch,
                journal,
                entries: Vec::new(),
                backups: 0,
                finished: false,
            }),
            Err(e) => {
                if let Err(cleanup) = remove_scratch(&scratch) {
                    warn!(scratch = %scratch.display(), error = %cleanup, "failed to remove apply scratch");
                }
                Err(ApplyError::io(&scratch, e))
            }
        }
    }

    /// Returns the number of file paths written or deleted.
    pub fn touched(&self) -> usize {
        self.entries.iter().filter(|undo| undo.touches_file()).count()
    }

    /// Keeps the applied changes and discards the journal.
    pub fn commit(mut self) {
        self.finished = true;
        if let Err(e) = remove_scratch(&self.scratch) {
            warn!(scratch = %self.scratch.display(), error = %e, "failed to remove apply scratch");
        }
    }

    /// Restores the tree to its state before the apply.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::RollbackFailed`] if any change could not be
    /// reverted. Reverting continues past individual failures.
    pub fn rollback(mut self) -> Result<(), ApplyError> {
        self.finished = true;
        self.restore()
    }

    fn restore(&mut self) -> Result<(), ApplyError> {
        let failures = revert_all(&self.scratch, &self.entries);

        if let Err(e) = remove_scratch(&self.scratch) {
            warn!(scratch = %self.scratch.display(), error = %e, "failed to remove apply scratch");
        }

        if failures.is_empty() {
            debug!(changes = self.entries.len(), "apply rolled back");
            Ok(())
        } else {
            Err(ApplyError::RollbackFailed(failures.join("; ")))
        }
    }

    /// Journals `undo`; the change it covers may start once this returns.
    fn record(&mut self, undo: Undo) -> Result<(), ApplyError> {
        self.journal
            .append(&undo)
            .map_err(|e| ApplyError::io(&self.scratch, e))?;
        self.entries.push(undo);
        Ok(())
    }

    fn back_up(&mut self, path: &Path) -> Result<String, ApplyError> {
        let name = self.backups.to_string();
        let backup = self.scratch.join(&name);
        fs::copy(path, &backup)
            .and_then(|_| File::open(&backup)?.sync_all())
            .map_err(|e| ApplyError::io(path, e))?;
        self.backups += 1;
        Ok(name)
    }

    fn write_file(&mut self, root: &Path, path: &Path, data: &[u8]) -> Result<(), ApplyError> {
        let existed = match fs::metadata(path) {
            Ok(meta) if meta.is_file() => true,
            Ok(_) => {
                // Only an empty directory gives way to a file.
                if !is_empty_dir(path).map_err(|e| ApplyError::io(path, e))? {
                    return Err(ApplyError::InvalidPath(path.display().to_string()));
                }
                self.record(Undo::RecreateDir {
                    path: path.to_path_buf(),
                })?;
                fs::remove_dir(path).map_err(|e| ApplyError::io(path, e))?;
                false
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(ApplyError::io(path, e)),
        };

        if existed {
            let backup = self.back_up(path)?;
            self.record(Undo::Restore {
                path: path.to_path_buf(),
                backup,
            })?;
        } else {
            self.create_parents(root, path)?;
            self.record(Undo::Remove {
                path: path.to_path_buf(),
            })?;
        }
        fs::write(path, data).map_err(|e| ApplyError::io(path, e))
    }

    fn delete_file(&mut self, root: &Path, path: &Path) -> Result<(), ApplyError> {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                // An empty directory holds no file, so there is nothing to delete.
                return if is_empty_dir(path).map_err(|e| ApplyError::io(path, e))? {
                    Ok(())
                } else {
                    Err(ApplyError::InvalidPath(path.display().to_string()))
                };
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(ApplyError::io(path, e)),
        }

        let backup = self.back_up(path)?;
        self.record(Undo::Restore {
            path: path.to_path_buf(),
            backup,
        })?;
        fs::remove_file(path).map_err(|e| ApplyError::io(path, e))?;
        self.prune_parents(root, path)
    }

    /// Removes the ancestors of `path` that are now empty, below `root`.
    fn prune_parents(&mut self, root: &Path, path: &Path) -> Result<(), ApplyError> {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == root
                || !dir.starts_with(root)
                || !is_empty_dir(dir).map_err(|e| ApplyError::io(dir, e))?
            {
                break;
            }
            self.record(Undo::RecreateDir {
                path: dir.to_path_buf(),
            })?;
            fs::remove_dir(dir).map_err(|e| ApplyError::io(dir, e))?;
            current = dir.parent();
        }
        Ok(())
    }

    /// Creates the missing ancestors of `path` inside `root`.
    fn create_parents(&mut self, root: &Path, path: &Path) -> Result<(), ApplyError> {
        let mut missing = Vec::new();
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == root || dir.exists() {
                break;
            }
            missing.push(dir.to_path_buf());
            current = dir.parent();
        }

        for dir in missing.into_iter().rev() {
            self.record(Undo::RemoveDir { path: dir.clone() })?;
            fs::create_dir(&dir).map_err(|e| ApplyError::io(&dir, e))?;
        }
        Ok(())
    }
}

impl Drop for ApplyGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.restore() {
            error!(target: "depot::audit", error = %e, "rollback of abandoned apply failed");
        }
    }
}

fn is_empty_dir(path: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}

fn remove_scratch(scratch: &Path) -> io::Result<()> {
    ignore_kind(fs::remove_dir_all(scratch), io::ErrorKind::NotFound)
}

/// Applies `commit` to `tree`, taking file contents from `archive`.
///
/// Operations run in commit order. Add and Modify write the archive entry,
/// creating parent directories and replacing an empty directory at the
/// target. Delete removes the file, succeeds if it is already gone, and
/// removes directories it leaves empty.
///
/// The undo journal lives in a fresh directory under `scratch_root`, tagged
/// with `intent` for crash recovery.
///
/// # Errors
///
/// Returns [`ApplyError::MissingEntry`] or [`ApplyError::InvalidPath`]
/// before anything is touched. Any failure during the apply restores the
/// tree before returning; if that restore fails too the result is
/// [`ApplyError::RollbackFailed`].
pub fn apply_commit(
    tree: &ProjectTree,
    scratch_root: &Path,
    intent: &ApplyIntent,
    commit: &Commit,
    archive: &Archive,
) -> Result<ApplyGuard, ApplyError> {
    let mut steps = Vec::with_capacity(commit.files.len());
    for diff in &commit.files {
        let path = tree
            .path_of(&diff.file_name)
            .ok_or_else(|| ApplyError::InvalidPath(diff.file_name.clone()))?;
        let data = match diff.operation {
            DiffType::Add | DiffType::Modify => Some(
                archive
                    .extract(&diff.file_name)
                    .map_err(|_| ApplyError::MissingEntry(diff.file_name.clone()))?,
            ),
            DiffType::Delete => None,
        };
        steps.push((diff, path, data));
    }

    let mut guard = ApplyGuard::begin(scratch_root, intent)?;
    let root = tree.root();

    for (diff, path, data) in steps {
        let result = match data {
            Some(bytes) => guard.write_file(root, &path, bytes),
            None => guard.delete_file(root, &path),
        };

        if let Err(e) = result {
            warn!(
                project = %intent.project,
                file = %diff.file_name,
                error = %e,
                "apply step failed, rolling back"
            );
            if let Err(rollback) = guard.rollback() {
                error!(
                    target: "depot::audit",
                    project = %intent.project,
                    commit_id = intent.commit_id,
                    file = %diff.file_name,
                    cause = %e,
                    error = %rollback,
                    "rollback after failed apply step is incomplete"
                );
                return Err(rollback.after(&e));
            }
            return Err(e);
        }
        debug!(file = %diff.file_name, op = %diff.operation, version = diff.version, "applied");
    }

    Ok(guard)
}

/// What [`recover_pending`] found in the scratch area.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Interrupted applies that were undone.
    pub rolled_back: usize,
    /// Leftovers of applies that were recorded or never changed the tree.
    pub discarded: usize,
}

/// Settles applies interrupted by a crash.
///
/// Each journal left under `scratch_root` is rolled back unless the ledger
/// already holds its commit, in which case the apply had finished and only
/// the journal is removed. Must run before any request is served.
///
/// # Errors
///
/// Fails on I/O or ledger errors, and with [`ApplyError::RollbackFailed`]
/// if an interrupted apply cannot be undone. The journal is then kept for
/// inspection.
pub fn recover_pending(scratch_root: &Path, ledger: &CommitLedger) -> ServerResult<RecoveryReport> {
    let mut report = RecoveryReport::default();
    let entries = match fs::read_dir(scratch_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let dir = entry?.path();
        if !dir.is_dir() {
            continue;
        }

        match read_journal(&dir)? {
            Some((intent, undo)) if ledger.head(&intent.project)? < intent.commit_id => {
                let failures = revert_all(&dir, &undo);
                if !failures.is_empty() {
                    return Err(ApplyError::RollbackFailed(failures.join("; ")).into());
                }
                warn!(
                    target: "depot::audit",
                    project = %intent.project,
                    commit_id = intent.commit_id,
                    changes = undo.len(),
                    "interrupted apply rolled back"
                );
                report.rolled_back += 1;
            }
            _ => report.discarded += 1,
        }
        remove_scratch(&dir)?;
    }

    if report != RecoveryReport::default() {
        info!(
            rolled_back = report.rolled_back,
            discarded = report.discarded,
            "scratch area recovered"
        );
    }
    Ok(report)
}
