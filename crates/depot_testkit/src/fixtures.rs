//! Test fixtures and request builders.
//!
//! [`TestServer`] wires a [`SyncServer`] to a temporary data directory with
//! one project, [`TEST_PROJECT`], reachable with [`TEST_TOKEN`].

use bytes::Bytes;
use depot_protocol::{Archive, Authority, Commit, FileDiff, PullRequest, PushRequest, Response};
use depot_server::{ProjectConfig, ProjectTree, ServerConfig, SyncServer};
use depot_storage::{CollectionStore, InMemoryStore};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Project configured on every test server.
pub const TEST_PROJECT: &str = "demo";
/// Token accepted for [`TEST_PROJECT`].
pub const TEST_TOKEN: &str = "secret";
/// Username sent by the builders.
pub const TEST_USER: &str = "tester";

/// Credentials for [`TEST_PROJECT`].
pub fn authority() -> Authority {
    Authority::new(TEST_PROJECT, TEST_TOKEN, TEST_USER)
}

/// A server on a temporary data directory with automatic cleanup.
pub struct TestServer {
    /// The server instance.
    pub server: SyncServer,
    /// The temporary directory (kept alive to prevent cleanup).
    dir: TempDir,
}

impl TestServer {
    /// Creates a server with an in-memory ledger.
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()))
    }

    /// Creates a server over the given ledger store.
    pub fn with_store(store: Arc<dyn CollectionStore>) -> Self {
        Self::build(|config| config, |config| SyncServer::new(config, store))
    }

    /// Creates a server whose configuration is adjusted by `configure`.
    pub fn with_config(configure: impl FnOnce(ServerConfig) -> ServerConfig) -> Self {
        Self::build(configure, |config| {
            SyncServer::new(config, Arc::new(InMemoryStore::new()))
        })
    }

    /// Creates a server with the file-backed ledger, as a deployment would.
    pub fn on_disk() -> Self {
        Self::build(
            |config| config,
            |config| SyncServer::open(config).expect("Failed to open server"),
        )
    }

    fn build(
        configure: impl FnOnce(ServerConfig) -> ServerConfig,
        open: impl FnOnce(ServerConfig) -> SyncServer,
    ) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let config = configure(
            ServerConfig::new(dir.path())
                .with_project(ProjectConfig::new(TEST_PROJECT, [TEST_TOKEN])),
        );
        Self {
            server: open(config),
            dir,
        }
    }

    /// Returns the data directory.
    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Opens the tree of [`TEST_PROJECT`].
    pub fn tree(&self) -> ProjectTree {
        self.server
            .context()
            .tree(TEST_PROJECT)
            .expect("Failed to open project tree")
    }

    /// Reads every file of [`TEST_PROJECT`] into a name to bytes map.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        let tree = self.tree();
        tree.files()
            .expect("Failed to list project tree")
            .into_iter()
            .map(|name| {
                let data = tree.read(&name).expect("Failed to read project file");
                (name, data)
            })
            .collect()
    }

    /// Returns the head commit id of [`TEST_PROJECT`].
    pub fn head(&self) -> u32 {
        self.server.head(TEST_PROJECT).expect("Failed to read head")
    }

    /// Sends a push and returns the response.
    pub fn push(&self, builder: PushBuilder) -> Response {
        self.server.handler().handle_push_bytes(builder.encode())
    }

    /// Pulls everything after `since` with valid credentials.
    pub fn pull(&self, since: u32) -> Response {
        self.server
            .handler()
            .handle_pull(&PullRequest::new(authority(), since))
    }
}

impl Default for TestServer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestServer {
    type Target = SyncServer;

    fn deref(&self) -> &Self::Target {
        &self.server
    }
}

/// Builder for push requests against [`TEST_PROJECT`].
///
/// # Example
///
/// ```rust
/// use depot_testkit::PushBuilder;
///
/// let request = PushBuilder::new()
///     .add("a.txt", 1, "hello")
///     .delete("old.txt", 4)
///     .build();
/// assert_eq!(request.commit.files.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct PushBuilder {
    authority: Authority,
    description: String,
    files: Vec<FileDiff>,
    file_map: String,
    archive: Archive,
}

impl PushBuilder {
    /// Starts an empty push with valid credentials.
    pub fn new() -> Self {
        Self {
            authority: authority(),
            description: "test commit".into(),
            files: Vec::new(),
            file_map: "{}".into(),
            archive: Archive::new(),
        }
    }

    /// Overrides the project name.
    pub fn project(mut self, project: &str) -> Self {
        self.authority.project_name = project.into();
        self
    }

    /// Overrides the access token.
    pub fn token(mut self, token: &str) -> Self {
        self.authority.access_token = token.into();
        self
    }

    /// Sets the commit description.
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the client file map.
    pub fn file_map(mut self, file_map: &str) -> Self {
        self.file_map = file_map.into();
        self
    }

    /// Adds a file with content.
    pub fn add(self, name: &str, version: u32, content: impl AsRef<[u8]>) -> Self {
        self.diff(FileDiff::add(name, version)).entry(name, content)
    }

    /// Modifies a file with new content.
    pub fn modify(self, name: &str, version: u32, content: impl AsRef<[u8]>) -> Self {
        self.diff(FileDiff::modify(name, version)).entry(name, content)
    }

    /// Deletes a file.
    pub fn delete(self, name: &str, version: u32) -> Self {
        self.diff(FileDiff::delete(name, version))
    }

    /// Appends a diff without touching the archive.
    pub fn diff(mut self, diff: FileDiff) -> Self {
        self.files.push(diff);
        self
    }

    /// Puts content in the archive without listing a diff.
    pub fn entry(mut self, name: &str, content: impl AsRef<[u8]>) -> Self {
        self.archive
            .insert(name, Bytes::copy_from_slice(content.as_ref()))
            .expect("Failed to add archive entry");
        self
    }

    /// Builds the request.
    pub fn build(self) -> PushRequest {
        PushRequest::new(
            self.authority,
            Commit::new(self.description, self.files),
            self.file_map,
            self.archive,
        )
    }

    /// Builds and encodes the request.
    pub fn encode(self) -> Bytes {
        self.build().encode().expect("Failed to encode push request")
    }
}

impl Default for PushBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes a pull request body.
pub fn pull_body(project: &str, token: &str, since: i64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "Authority": {
            "ProjectName": project,
            "AccessToken": token,
            "Username": TEST_USER,
        },
        "CommitId": since,
    }))
    .expect("Failed to encode pull request")
}

/// Unwraps a [`Response::Pulled`].
///
/// # Panics
///
/// Panics on any other response.
pub fn expect_pulled(response: Response) -> (u32, Archive) {
    match response {
        Response::Pulled { head, archive } => (head, archive),
        other => panic!("expected Pulled, got {other:?}"),
    }
}
