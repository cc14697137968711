//! Push and pull request handling.

use crate::apply::{apply_commit, ApplyIntent};
use crate::auth::AccessGate;
use crate::config::{ProjectConfig, ProjectStore, ServerConfig};
use crate::error::{ApplyError, ServerError, ServerResult};
use crate::ledger::CommitLedger;
use crate::locks::ProjectLocks;
use crate::tree::ProjectTree;
use depot_protocol::{
    compose, Archive, Authority, CommitRecord, ProtocolError, PullRequest, PushRequest, Response,
};
use depot_protocol::framing::FrameReader;
use depot_storage::CollectionStore;
use bytes::Bytes;
use std::fs;
use std::io;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared state for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Credential check.
    pub gate: AccessGate,
    /// Commit history of every project.
    pub ledger: CommitLedger,
    /// Per-project critical sections.
    pub locks: ProjectLocks,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(
        config: ServerConfig,
        projects: Arc<dyn ProjectStore>,
        store: Arc<dyn CollectionStore>,
    ) -> Self {
        Self {
            config,
            gate: AccessGate::new(projects),
            ledger: CommitLedger::new(store),
            locks: ProjectLocks::new(),
        }
    }

    /// Opens the working tree of `project`.
    pub fn tree(&self, project: &str) -> ServerResult<ProjectTree> {
        Ok(ProjectTree::open(self.config.project_dir(project))?)
    }

    /// Stores the client's file map for `project`, replacing the old one.
    fn write_file_map(&self, project: &str, file_map: &str) -> io::Result<()> {
        let dir = self.config.filemaps_dir();
        fs::create_dir_all(&dir)?;
        let target = dir.join(format!("{project}.json"));
        let tmp = dir.join(format!("{project}.json.tmp"));
        fs::write(&tmp, file_map)?;
        fs::rename(&tmp, &target)
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("config", &self.config)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

/// Handler for push and pull requests.
///
/// The `handle_*` methods never fail: every outcome, including malformed
/// input, maps to exactly one [`Response`]. The `push` and `pull` methods
/// expose the typed result underneath.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Returns the shared context.
    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.context
    }

    /// Checks the credentials of a request.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotFound`] for unknown projects and bad tokens.
    pub fn authorize(&self, authority: &Authority) -> ServerResult<ProjectConfig> {
        self.context.gate.authorize_authority(authority)
    }

    /// Applies and records a push.
    ///
    /// Returns the id of the new commit. Versions are checked against the
    /// ledger, then the commit is applied and appended while the project
    /// lock is held. A failure at any step leaves tree and ledger as they
    /// were.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotFound`], [`ServerError::Apply`] or
    /// [`ServerError::Ledger`].
    pub fn push(&self, request: &PushRequest) -> ServerResult<u32> {
        let project = self.authorize(&request.authority)?.name;
        let ctx = &self.context;

        let record = ctx.locks.exclusive(&project, || -> ServerResult<CommitRecord> {
            for diff in &request.commit.files {
                if let Some(previous) = ctx.ledger.recorded_version(&project, &diff.file_name)? {
                    if diff.version <= previous {
                        return Err(ApplyError::StaleVersion {
                            file_name: diff.file_name.clone(),
                            version: diff.version,
                            recorded: previous,
                        }
                        .into());
                    }
                }
            }

            let intent = ApplyIntent::new(project.as_str(), ctx.ledger.next_commit_id(&project)?);
            let tree = ctx.tree(&project)?;
            let guard = apply_commit(
                &tree,
                &ctx.config.scratch_dir(),
                &intent,
                &request.commit,
                &request.archive,
            )?;

            let record = CommitRecord::from_commit(intent.commit_id, &request.commit);
            if let Err(e) = ctx.ledger.append_record(&project, &record) {
                if let Err(rollback) = guard.rollback() {
                    error!(
                        target: "depot::audit",
                        project = %project,
                        cause = %e,
                        error = %rollback,
                        "tree not restored after ledger failure"
                    );
                    return Err(rollback.after(&e).into());
                }
                return Err(e.into());
            }
            guard.commit();

            if let Err(e) = ctx.write_file_map(&project, &request.file_map) {
                warn!(project = %project, error = %e, "failed to store file map");
            }
            Ok(record)
        })?;

        info!(
            project = %project,
            user = %request.authority.username,
            commit_id = record.commit_id,
            files = record.files.len(),
            "push accepted"
        );
        Ok(record.commit_id)
    }

    /// Computes what a client at `request.commit_id` needs.
    ///
    /// Returns `None` when the client is up to date, otherwise the head
    /// commit id and the archive of net changes.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotFound`], a protocol error for an invalid
    /// commit id, or [`ServerError::Internal`] if history or tree cannot be
    /// read.
    pub fn pull(&self, request: &PullRequest) -> ServerResult<Option<(u32, Archive)>> {
        let project = self.authorize(&request.authority)?.name;
        let since = request.since()?;
        let ctx = &self.context;

        let pulled = ctx.locks.exclusive(&project, || -> ServerResult<Option<(u32, Archive)>> {
            let records = ctx
                .ledger
                .range_since(&project, since)
                .map_err(|e| ServerError::Internal(e.to_string()))?;
            let Some(head) = records.last().map(|r| r.commit_id) else {
                return Ok(None);
            };

            let composite = compose(&records);
            let archive = ctx.tree(&project)?.build_archive(&composite)?;
            Ok(Some((head, archive)))
        })?;

        match &pulled {
            Some((head, archive)) => info!(
                project = %project,
                user = %request.authority.username,
                since,
                head,
                files = archive.len(),
                "pull served"
            ),
            None => debug!(project = %project, since, "nothing to pull"),
        }
        Ok(pulled)
    }

    /// Handles a decoded push request.
    pub fn handle_push(&self, request: PushRequest) -> Response {
        match self.push(&request) {
            Ok(commit_id) => Response::Pushed { commit_id },
            Err(e) => self.failure(&request.authority, "push", e),
        }
    }

    /// Handles a raw push request.
    ///
    /// The authority frame is checked before the rest is decoded.
    pub fn handle_push_bytes(&self, bytes: impl Into<Bytes>) -> Response {
        let mut reader = FrameReader::new(bytes);
        let authority = match reader
            .read_frame()
            .and_then(|frame| Authority::from_json(&frame))
        {
            Ok(authority) => authority,
            Err(e) => return protocol_failure("push", &e),
        };
        self.handle_push_body(authority, reader.into_rest())
    }

    /// Handles a push whose authority frame was already read.
    pub fn handle_push_body(&self, authority: Authority, body: impl Into<Bytes>) -> Response {
        if let Err(e) = self.authorize(&authority) {
            return self.failure(&authority, "push", e);
        }

        let mut reader = FrameReader::new(body);
        match PushRequest::decode_body(authority, &mut reader) {
            Ok(request) => self.handle_push(request),
            Err(e) => protocol_failure("push", &e),
        }
    }

    /// Handles a decoded pull request.
    pub fn handle_pull(&self, request: &PullRequest) -> Response {
        match self.pull(request) {
            Ok(Some((head, archive))) => Response::Pulled { head, archive },
            Ok(None) => Response::NothingToPull,
            Err(e) => self.failure(&request.authority, "pull", e),
        }
    }

    /// Handles a raw pull request body.
    pub fn handle_pull_json(&self, body: &[u8]) -> Response {
        match PullRequest::from_json(body) {
            Ok(request) => self.handle_pull(&request),
            Err(e) => protocol_failure("pull", &e),
        }
    }

    fn failure(&self, authority: &Authority, action: &'static str, err: ServerError) -> Response {
        match &err {
            ServerError::NotFound => {
                debug!(action, project = %authority.project_name, "request refused");
            }
            ServerError::Apply(_) | ServerError::Ledger(_) => {
                error!(
                    target: "depot::audit",
                    action,
                    project = %authority.project_name,
                    user = %authority.username,
                    error = %err,
                    "update failed, project restored"
                );
            }
            _ if err.is_client_error() => {
                debug!(action, project = %authority.project_name, error = %err, "bad request");
            }
            _ => {
                error!(action, project = %authority.project_name, error = %err, "request failed");
            }
        }
        err.response()
    }
}

fn protocol_failure(action: &'static str, err: &ProtocolError) -> Response {
    debug!(action, error = %err, "malformed request");
    Response::ProtocolFailure
}
