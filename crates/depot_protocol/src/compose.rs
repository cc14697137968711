//! Diff composition: folding a run of commits into one net change per file.
//!
//! The fold keeps, per file, the latest observed operation and version plus
//! whether the file existed before the run began (decided by the first
//! operation seen: an Add means it did not). The net effect is then:
//!
//! | existed before | exists after | net                        |
//! |----------------|--------------|----------------------------|
//! | any            | yes          | latest operation (Add/Modify) |
//! | yes            | no           | Delete                     |
//! | no             | no           | nothing (squashed)         |
//!
//! This gives Add→Modify = Modify, Add→Delete = squashed, Modify→Delete =
//! Delete, Delete→Add = Add and Modify→Modify = Modify, and keeps
//! Delete→Add→Delete a Delete. Because each entry is "first origin, last
//! value", folding is associative: composing a run equals composing any
//! split of it and joining the halves with [`CompositeDiff::then`].

use crate::model::{CommitRecord, DiffType, FileDiff};
use std::collections::BTreeMap;

/// Net change for one file over a run of commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetChange {
    /// Operation a client must perform.
    pub operation: DiffType,
    /// Latest version observed for the file.
    pub version: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tracked {
    latest: DiffType,
    version: u32,
    existed_before: bool,
}

impl Tracked {
    fn first(diff: &FileDiff) -> Self {
        Self {
            latest: diff.operation,
            version: diff.version,
            existed_before: diff.operation != DiffType::Add,
        }
    }

    fn net(&self) -> Option<NetChange> {
        let operation = if self.latest.leaves_file() {
            self.latest
        } else if self.existed_before {
            DiffType::Delete
        } else {
            return None;
        };

        Some(NetChange {
            operation,
            version: self.version,
        })
    }
}

/// The folded result of an ordered run of commits.
///
/// Files whose net effect is "never existed" are squashed: they do not
/// appear in [`CompositeDiff::iter`], but are still listed by
/// [`CompositeDiff::squashed`] so a server can send harmless delete markers
/// for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeDiff {
    files: BTreeMap<String, Tracked>,
}

impl CompositeDiff {
    /// Creates an empty composite.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one file change into the composite.
    pub fn observe(&mut self, diff: &FileDiff) {
        match self.files.get_mut(&diff.file_name) {
            Some(tracked) => {
                tracked.latest = diff.operation;
                tracked.version = diff.version;
            }
            None => {
                self.files
                    .insert(diff.file_name.clone(), Tracked::first(diff));
            }
        }
    }

    /// Folds every change of a commit, in order.
    pub fn fold_record(&mut self, record: &CommitRecord) {
        for diff in &record.files {
            self.observe(diff);
        }
    }

    /// Joins this composite with one covering the commits right after it.
    #[must_use]
    pub fn then(mut self, later: &CompositeDiff) -> CompositeDiff {
        for (name, next) in &later.files {
            match self.files.get_mut(name) {
                Some(tracked) => {
                    tracked.latest = next.latest;
                    tracked.version = next.version;
                }
                None => {
                    self.files.insert(name.clone(), *next);
                }
            }
        }
        self
    }

    /// Returns the net change for `file_name`, if any.
    pub fn get(&self, file_name: &str) -> Option<NetChange> {
        self.files.get(file_name).and_then(Tracked::net)
    }

    /// Iterates net changes in file name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, NetChange)> {
        self.files
            .iter()
            .filter_map(|(name, tracked)| tracked.net().map(|net| (name.as_str(), net)))
    }

    /// Iterates files that were added and deleted again inside the run.
    pub fn squashed(&self) -> impl Iterator<Item = &str> {
        self.files
            .iter()
            .filter(|(_, tracked)| tracked.net().is_none())
            .map(|(name, _)| name.as_str())
    }

    /// Returns the number of files with a net change.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns true if no file has a net change.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Returns the net changes as file diffs, in file name order.
    pub fn to_file_diffs(&self) -> Vec<FileDiff> {
        self.iter()
            .map(|(name, net)| FileDiff::new(name, net.version, net.operation))
            .collect()
    }
}

/// Folds `records` (ascending commit id) into one composite.
///
/// An empty slice yields an empty composite.
pub fn compose(records: &[CommitRecord]) -> CompositeDiff {
    let mut composite = CompositeDiff::new();
    for record in records {
        composite.fold_record(record);
    }
    composite
}
