//! Property-based test generators using proptest.
//!
//! Histories are generated over a small pool of file names so that the same
//! file is touched many times, which is where composition gets interesting.
//! Each generated history is valid: commit ids run 1..=N, versions strictly
//! increase per file, and Modify only targets files that exist.

use depot_protocol::{CommitRecord, CompositeDiff, DiffType, FileDiff};
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// File names histories are drawn from.
pub const FILE_POOL: [&str; 5] = [
    "a.txt",
    "b.txt",
    "docs/readme.md",
    "docs/guide/intro.md",
    "assets/logo.png",
];

/// Deterministic content for `name` at `version`.
pub fn content_for(name: &str, version: u32) -> String {
    format!("{name}@{version}")
}

/// Strategy for generating valid relative file names.
pub fn file_name_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z0-9_][a-z0-9_.-]{0,7}", 1..4)
        .prop_filter("no dot-only components", |parts| {
            parts.iter().all(|p| p != "." && p != "..")
        })
        .prop_map(|parts| parts.join("/"))
}

/// Strategy for generating a valid commit history of 1..=`max_commits`
/// commits, each touching one to three distinct files.
pub fn history_strategy(max_commits: usize) -> impl Strategy<Value = Vec<CommitRecord>> {
    let step = (0..FILE_POOL.len(), 0u8..4);
    prop::collection::vec(prop::collection::vec(step, 1..=3), 1..=max_commits.max(1))
        .prop_map(build_history)
}

/// Strategy for a history together with two split points `i <= j`.
pub fn split_history_strategy(
    max_commits: usize,
) -> impl Strategy<Value = (Vec<CommitRecord>, usize, usize)> {
    history_strategy(max_commits).prop_flat_map(|history| {
        let len = history.len();
        (Just(history), 0..=len, 0..=len).prop_map(|(history, a, b)| (history, a.min(b), a.max(b)))
    })
}

fn build_history(commits: Vec<Vec<(usize, u8)>>) -> Vec<CommitRecord> {
    let mut exists: HashMap<&str, bool> = HashMap::new();
    let mut versions: HashMap<&str, u32> = HashMap::new();
    let mut records = Vec::with_capacity(commits.len());

    for (index, steps) in commits.into_iter().enumerate() {
        let mut files = Vec::new();
        for (file, choice) in steps {
            let name = FILE_POOL[file];
            if files.iter().any(|d: &FileDiff| d.file_name == name) {
                continue;
            }

            let present = exists.get(name).copied().unwrap_or(false);
            let operation = match (present, choice) {
                (true, 0 | 1) => DiffType::Modify,
                (true, _) => DiffType::Delete,
                // Deleting an absent file is legal and must stay harmless.
                (false, 0) => DiffType::Delete,
                (false, _) => DiffType::Add,
            };

            let version = versions.get(name).copied().unwrap_or(0) + 1 + u32::from(choice % 2);
            versions.insert(name, version);
            exists.insert(name, operation.leaves_file());
            files.push(FileDiff::new(name, version, operation));
        }

        records.push(CommitRecord {
            commit_id: index as u32 + 1,
            description: format!("generated commit {}", index + 1),
            files,
        });
    }

    records
}

/// A project tree reduced to file name and version.
///
/// Content is implied by [`content_for`], so comparing models compares
/// trees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelTree {
    files: BTreeMap<String, u32>,
}

impl ModelTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replays `records` one operation at a time.
    pub fn replay(records: &[CommitRecord]) -> Self {
        let mut tree = Self::new();
        for record in records {
            tree.apply_record(record);
        }
        tree
    }

    /// Applies one commit the way the server does.
    pub fn apply_record(&mut self, record: &CommitRecord) {
        for diff in &record.files {
            if diff.operation.leaves_file() {
                self.files.insert(diff.file_name.clone(), diff.version);
            } else {
                self.files.remove(&diff.file_name);
            }
        }
    }

    /// Applies a composite the way a pulling client does, including the
    /// delete markers sent for squashed files.
    pub fn apply_composite(&mut self, composite: &CompositeDiff) {
        for (name, change) in composite.iter() {
            if change.operation.leaves_file() {
                self.files.insert(name.to_string(), change.version);
            } else {
                self.files.remove(name);
            }
        }
        for name in composite.squashed() {
            self.files.remove(name);
        }
    }

    /// Returns the file versions.
    pub fn files(&self) -> &BTreeMap<String, u32> {
        &self.files
    }

    /// Returns the tree as file contents.
    pub fn contents(&self) -> BTreeMap<String, Vec<u8>> {
        self.files
            .iter()
            .map(|(name, version)| (name.clone(), content_for(name, *version).into_bytes()))
            .collect()
    }
}
