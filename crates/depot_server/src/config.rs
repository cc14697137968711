//! Server configuration and the project settings file.

use crate::error::{ServerError, ServerResult};
use depot_storage::validate_collection_name;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default upper bound on an incoming push request (512 MiB).
pub const DEFAULT_MAX_PUSH_BYTES: usize = 512 * 1024 * 1024;

/// One configured project and the tokens allowed to touch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProjectConfig {
    /// Unique project name.
    pub name: String,
    /// Tokens accepted for this project.
    #[serde(default)]
    pub access_tokens: Vec<String>,
}

impl ProjectConfig {
    /// Creates a project entry.
    pub fn new<I, S>(name: impl Into<String>, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            access_tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

/// Read-only lookup of project configuration.
pub trait ProjectStore: Send + Sync {
    /// Returns the configuration for `name`, if the project exists.
    fn project(&self, name: &str) -> Option<ProjectConfig>;

    /// Returns all project names, sorted.
    fn project_names(&self) -> Vec<String>;
}

/// [`ProjectStore`] backed by the loaded settings file.
#[derive(Debug, Clone, Default)]
pub struct ProjectsSettings {
    projects: Vec<ProjectConfig>,
}

impl ProjectsSettings {
    /// Creates the store from a project list.
    pub fn new(projects: Vec<ProjectConfig>) -> Self {
        Self { projects }
    }
}

impl ProjectStore for ProjectsSettings {
    fn project(&self, name: &str) -> Option<ProjectConfig> {
        self.projects.iter().find(|p| p.name == name).cloned()
    }

    fn project_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.projects.iter().map(|p| p.name.clone()).collect();
        names.sort();
        names
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_max_push_bytes() -> usize {
    DEFAULT_MAX_PUSH_BYTES
}

/// Configuration for the sync server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerConfig {
    /// Root of projects, ledger, file maps and scratch space.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Largest push request accepted, in bytes.
    #[serde(default = "default_max_push_bytes")]
    pub max_push_bytes: usize,
    /// Configured projects.
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

impl ServerConfig {
    /// Creates a configuration rooted at `data_dir` with no projects.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_push_bytes: DEFAULT_MAX_PUSH_BYTES,
            projects: Vec::new(),
        }
    }

    /// Sets the maximum push request size.
    pub fn with_max_push_bytes(mut self, max: usize) -> Self {
        self.max_push_bytes = max;
        self
    }

    /// Adds one project.
    pub fn with_project(mut self, project: ProjectConfig) -> Self {
        self.projects.push(project);
        self
    }

    /// Adds several projects.
    pub fn with_projects(mut self, projects: impl IntoIterator<Item = ProjectConfig>) -> Self {
        self.projects.extend(projects);
        self
    }

    /// Loads and validates a settings file.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the file cannot be read, is not
    /// valid settings JSON, or fails [`ServerConfig::validate`].
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// Parses and validates settings JSON.
    ///
    /// # Errors
    ///
    /// See [`ServerConfig::load`].
    pub fn from_json(text: &str) -> ServerResult<Self> {
        let config: ServerConfig = serde_json::from_str(text)
            .map_err(|e| ServerError::Config(format!("invalid settings: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks project names and limits.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] for unusable or repeated project
    /// names, or a zero push limit.
    pub fn validate(&self) -> ServerResult<()> {
        if self.max_push_bytes == 0 {
            return Err(ServerError::Config("MaxPushBytes must be positive".into()));
        }

        let mut seen = HashSet::new();
        for project in &self.projects {
            validate_collection_name(&project.name)
                .map_err(|_| ServerError::Config(format!("invalid project name {:?}", project.name)))?;
            if !seen.insert(project.name.as_str()) {
                return Err(ServerError::Config(format!(
                    "project {} is configured twice",
                    project.name
                )));
            }
        }
        Ok(())
    }

    /// Returns the configured projects as a [`ProjectStore`].
    pub fn project_store(&self) -> ProjectsSettings {
        ProjectsSettings::new(self.projects.clone())
    }

    /// Directory holding every project tree.
    pub fn projects_dir(&self) -> PathBuf {
        self.data_dir.join("projects")
    }

    /// Tree root of one project.
    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.projects_dir().join(project)
    }

    /// Directory of the file-backed ledger store.
    pub fn ledger_dir(&self) -> PathBuf {
        self.data_dir.join("ledger")
    }

    /// Directory of stored client file maps.
    pub fn filemaps_dir(&self) -> PathBuf {
        self.data_dir.join("filemaps")
    }

    /// Directory for per-apply snapshots.
    pub fn scratch_dir(&self) -> PathBuf {
        self.data_dir.join("scratch")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(default_data_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.max_push_bytes, DEFAULT_MAX_PUSH_BYTES);
        assert!(config.projects.is_empty());
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("/srv/depot")
            .with_max_push_bytes(1024)
            .with_project(ProjectConfig::new("game", ["t1", "t2"]));

        assert_eq!(config.max_push_bytes, 1024);
        assert_eq!(config.project_dir("game"), PathBuf::from("/srv/depot/projects/game"));
        assert_eq!(config.ledger_dir(), PathBuf::from("/srv/depot/ledger"));
        assert_eq!(config.projects[0].access_tokens, vec!["t1", "t2"]);
    }

    #[test]
    fn settings_json() {
        let config = ServerConfig::from_json(
            r#"{
                "DataDir": "/var/depot",
                "Projects": [
                    {"Name": "game", "AccessTokens": ["abc"]},
                    {"Name": "docs"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/depot"));
        assert_eq!(config.max_push_bytes, DEFAULT_MAX_PUSH_BYTES);

        let store = config.project_store();
        assert_eq!(store.project_names(), vec!["docs", "game"]);
        assert_eq!(store.project("game").unwrap().access_tokens, vec!["abc"]);
        assert!(store.project("docs").unwrap().access_tokens.is_empty());
        assert!(store.project("missing").is_none());
    }

    #[test]
    fn duplicate_projects_are_rejected() {
        let config = ServerConfig::new("d")
            .with_project(ProjectConfig::new("a", ["x"]))
            .with_project(ProjectConfig::new("a", ["y"]));
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn unsafe_project_names_are_rejected() {
        for name in ["", "../up", "a/b", ".hidden"] {
            let config = ServerConfig::new("d").with_project(ProjectConfig::new(name, ["x"]));
            assert!(config.validate().is_err(), "{name:?} accepted");
        }
    }

    #[test]
    fn malformed_settings() {
        assert!(ServerConfig::from_json("{").is_err());
        assert!(ServerConfig::from_json(r#"{"MaxPushBytes": 0}"#).is_err());
        assert!(ServerConfig::load(Path::new("/nonexistent/settings.json")).is_err());
    }
}
