//! Commit data model and schema validation.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Credentials sent with every request.
///
/// Constructed per request and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Authority {
    /// Project the request targets.
    pub project_name: String,
    /// Token that must be listed for the project.
    pub access_token: String,
    /// Display name of the pushing user, used for logging only.
    pub username: String,
}

impl Authority {
    /// Creates a new authority.
    pub fn new(
        project_name: impl Into<String>,
        access_token: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            access_token: access_token.into(),
            username: username.into(),
        }
    }

    /// Parses an authority from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Json`] if a field is missing or mistyped.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serializes to JSON.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Kind of change a [`FileDiff`] makes.
///
/// Travels as an integer code on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DiffType {
    /// The file is new.
    Add,
    /// The file's content changed.
    Modify,
    /// The file was removed.
    Delete,
}

impl DiffType {
    /// Converts to the wire code.
    #[must_use]
    pub fn to_code(self) -> u8 {
        match self {
            DiffType::Add => 0,
            DiffType::Modify => 1,
            DiffType::Delete => 2,
        }
    }

    /// Converts from the wire code.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DiffType::Add),
            1 => Some(DiffType::Modify),
            2 => Some(DiffType::Delete),
            _ => None,
        }
    }

    /// Returns true if the file has content after this change.
    #[must_use]
    pub fn leaves_file(self) -> bool {
        !matches!(self, DiffType::Delete)
    }
}

impl TryFrom<u8> for DiffType {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        DiffType::from_code(code)
            .ok_or_else(|| ProtocolError::invalid_field("DiffType", format!("unknown code {code}")))
    }
}

impl From<DiffType> for u8 {
    fn from(diff_type: DiffType) -> Self {
        diff_type.to_code()
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DiffType::Add => "add",
            DiffType::Modify => "modify",
            DiffType::Delete => "delete",
        };
        f.pad(name)
    }
}

/// One file-level change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    /// Relative, `/`-separated path inside the project.
    #[serde(rename = "FileName")]
    pub file_name: String,
    /// Version of the file after this change. Monotonic per file.
    #[serde(rename = "Version")]
    pub version: u32,
    /// What happened to the file.
    #[serde(rename = "DiffType")]
    pub operation: DiffType,
}

impl FileDiff {
    /// Creates a new file diff.
    pub fn new(file_name: impl Into<String>, version: u32, operation: DiffType) -> Self {
        Self {
            file_name: file_name.into(),
            version,
            operation,
        }
    }

    /// Creates an Add diff.
    pub fn add(file_name: impl Into<String>, version: u32) -> Self {
        Self::new(file_name, version, DiffType::Add)
    }

    /// Creates a Modify diff.
    pub fn modify(file_name: impl Into<String>, version: u32) -> Self {
        Self::new(file_name, version, DiffType::Modify)
    }

    /// Creates a Delete diff.
    pub fn delete(file_name: impl Into<String>, version: u32) -> Self {
        Self::new(file_name, version, DiffType::Delete)
    }
}

/// A client-authored set of file changes, consumed by one push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Commit {
    /// Free-form description.
    pub description: String,
    /// Changes in the order they must be applied.
    pub files: Vec<FileDiff>,
}

impl Commit {
    /// Creates a new commit.
    pub fn new(description: impl Into<String>, files: Vec<FileDiff>) -> Self {
        Self {
            description: description.into(),
            files,
        }
    }

    /// Parses and validates a commit from JSON.
    ///
    /// File names are normalized (see [`normalize_file_name`]).
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if the JSON is malformed, the commit is
    /// empty, a name is unsafe or repeated, or a version is zero.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        let mut commit: Commit = serde_json::from_slice(bytes)?;
        commit.validate()?;
        Ok(commit)
    }

    /// Serializes to JSON.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Normalizes file names in place and checks the commit invariants.
    ///
    /// # Errors
    ///
    /// See [`Commit::from_json`].
    pub fn validate(&mut self) -> ProtocolResult<()> {
        if self.files.is_empty() {
            return Err(ProtocolError::invalid_field("Files", "commit has no files"));
        }

        let mut seen = HashSet::with_capacity(self.files.len());
        for diff in &mut self.files {
            diff.file_name = normalize_file_name(&diff.file_name)?;
            if diff.version == 0 {
                return Err(ProtocolError::invalid_field(
                    "Version",
                    format!("{} has version 0", diff.file_name),
                ));
            }
            if !seen.insert(diff.file_name.clone()) {
                return Err(ProtocolError::DuplicateFile(diff.file_name.clone()));
            }
        }
        Ok(())
    }
}

/// A commit as recorded in the ledger.
///
/// Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommitRecord {
    /// 1-based, contiguous, per project.
    pub commit_id: u32,
    /// Description copied from the commit.
    pub description: String,
    /// Changes in apply order.
    pub files: Vec<FileDiff>,
}

impl CommitRecord {
    /// Builds the record for an applied commit.
    pub fn from_commit(commit_id: u32, commit: &Commit) -> Self {
        Self {
            commit_id,
            description: commit.description.clone(),
            files: commit.files.clone(),
        }
    }
}

/// Normalizes a client file name into a safe relative path.
///
/// Backslashes become `/`. The result is non-empty, relative, and contains
/// no empty, `.` or `..` components, no `:` and no NUL bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidFileName`] for anything that could escape
/// the project directory.
///
/// # Example
///
/// ```
/// use depot_protocol::normalize_file_name;
///
/// assert_eq!(normalize_file_name("assets\\logo.png").unwrap(), "assets/logo.png");
/// assert!(normalize_file_name("../etc/passwd").is_err());
/// ```
pub fn normalize_file_name(name: &str) -> ProtocolResult<String> {
    let normalized = name.replace('\\', "/");
    let invalid = || ProtocolError::InvalidFileName(name.to_string());

    if normalized.is_empty() || normalized.starts_with('/') {
        return Err(invalid());
    }
    if normalized.contains(':') || normalized.contains('\0') {
        return Err(invalid());
    }
    if normalized
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(invalid());
    }

    Ok(normalized)
}
