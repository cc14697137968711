//! Project working tree on disk.

use crate::error::{ServerError, ServerResult};
use depot_protocol::{normalize_file_name, Archive, CompositeDiff, DiffType};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The directory holding the current files of one project.
#[derive(Debug, Clone)]
pub struct ProjectTree {
    root: PathBuf,
}

impl ProjectTree {
    /// Opens the tree at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Returns the tree root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a project-relative file name to a path inside the tree.
    ///
    /// Returns `None` for names that are not safe relative paths.
    pub fn path_of(&self, file_name: &str) -> Option<PathBuf> {
        let normalized = normalize_file_name(file_name).ok()?;
        let mut path = self.root.clone();
        for part in normalized.split('/') {
            path.push(part);
        }
        Some(path)
    }

    /// Reads the current content of `file_name`.
    pub fn read(&self, file_name: &str) -> io::Result<Vec<u8>> {
        let path = self
            .path_of(file_name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, file_name.to_string()))?;
        fs::read(path)
    }

    /// Builds the archive a client needs to reach the composite's end state.
    ///
    /// Adds and modifies carry the file's current bytes; deletes and files
    /// squashed inside the run become delete markers. Deleting an absent
    /// file is harmless on the client, so the markers for squashed files
    /// only tidy up copies the client may hold from an earlier pull.
    ///
    /// # Errors
    ///
    /// Fails if a file the composite says exists cannot be read.
    pub fn build_archive(&self, composite: &CompositeDiff) -> ServerResult<Archive> {
        let mut archive = Archive::new();

        for (name, change) in composite.iter() {
            match change.operation {
                DiffType::Add | DiffType::Modify => {
                    let data = self.read(name).map_err(|e| {
                        ServerError::Internal(format!("tree is missing {name}: {e}"))
                    })?;
                    archive.insert(name, data)?;
                }
                DiffType::Delete => archive.mark_deleted(name)?,
            }
        }

        for name in composite.squashed() {
            archive.mark_deleted(name)?;
        }

        Ok(archive)
    }

    /// Lists every file in the tree as sorted `/`-separated names.
    pub fn files(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        collect(&self.root, String::new(), &mut names)?;
        names.sort();
        Ok(names)
    }
}

fn collect(dir: &Path, prefix: String, names: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let relative = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };

        if entry.file_type()?.is_dir() {
            collect(&entry.path(), relative, names)?;
        } else {
            names.push(relative);
        }
    }
    Ok(())
}
