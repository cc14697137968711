//! Main sync server and its async stream entry points.

use crate::apply::recover_pending;
use crate::config::{ProjectStore, ServerConfig};
use crate::error::{LedgerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use depot_protocol::framing::frame_len;
use depot_protocol::{Authority, Response};
use depot_storage::{CollectionStore, FileStore};
use std::fs;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info};

/// Largest authority frame read before the caller is authorized.
const MAX_AUTHORITY_BYTES: usize = 64 * 1024;

/// The sync server.
///
/// Owns the handler context and exposes push/pull over any async byte
/// stream. Blocking work (locking, file I/O, ledger writes) runs on tokio's
/// blocking pool; network reads and writes happen outside project locks.
///
/// # Example
///
/// ```
/// use depot_server::{ProjectConfig, ServerConfig, SyncServer};
/// use depot_storage::InMemoryStore;
/// use std::sync::Arc;
///
/// let dir = tempfile::tempdir().unwrap();
/// let config = ServerConfig::new(dir.path())
///     .with_project(ProjectConfig::new("demo", ["secret"]));
/// let server = SyncServer::new(config, Arc::new(InMemoryStore::new()));
///
/// assert_eq!(server.head("demo").unwrap(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct SyncServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl SyncServer {
    /// Creates a server over `store`, using the projects listed in `config`.
    pub fn new(config: ServerConfig, store: Arc<dyn CollectionStore>) -> Self {
        let projects = Arc::new(config.project_store());
        Self::with_project_store(config, projects, store)
    }

    /// Creates a server with a custom project configuration store.
    pub fn with_project_store(
        config: ServerConfig,
        projects: Arc<dyn ProjectStore>,
        store: Arc<dyn CollectionStore>,
    ) -> Self {
        let context = Arc::new(HandlerContext::new(config, projects, store));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Opens a server on disk: validates `config`, creates the data layout,
    /// opens the file-backed ledger and settles applies interrupted by a
    /// crash.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, I/O errors, if another process
    /// holds the ledger, or if an interrupted apply cannot be undone.
    pub fn open(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        for dir in [
            config.projects_dir(),
            config.filemaps_dir(),
            config.scratch_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }

        let store = FileStore::open(&config.ledger_dir()).map_err(LedgerError::from)?;
        let server = Self::new(config, Arc::new(store));
        let config = &server.context.config;
        recover_pending(&config.scratch_dir(), &server.context.ledger)?;

        info!(
            data_dir = %config.data_dir.display(),
            projects = config.projects.len(),
            "server opened"
        );
        Ok(server)
    }

    /// Returns the request handler.
    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// Returns the shared handler context.
    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.context
    }

    /// Returns the head commit id of `project` (0 if it has no history).
    pub fn head(&self, project: &str) -> ServerResult<u32> {
        Ok(self.context.ledger.head(project)?)
    }

    /// Reads one push request from `reader` and writes the response to
    /// `writer`.
    ///
    /// The authority frame is read and checked first; only an authorized
    /// caller gets the rest of the request (up to the configured maximum)
    /// buffered. The request ends at end-of-stream.
    ///
    /// Returns the response that was sent.
    ///
    /// # Errors
    ///
    /// Only fails if the response cannot be written.
    pub async fn serve_push<R, W>(&self, mut reader: R, mut writer: W) -> io::Result<Response>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let response = match self.read_authority(&mut reader).await {
            Err(e) => {
                debug!(error = %e, "unreadable push authority");
                Response::ProtocolFailure
            }
            Ok(authority) => match self.handler.authorize(&authority) {
                Err(e) => e.response(),
                Ok(_) => self.read_and_push(authority, &mut reader).await,
            },
        };

        write_response(&mut writer, &response).await?;
        Ok(response)
    }

    /// Answers one pull request body and writes the response to `writer`.
    ///
    /// Returns the response that was sent.
    ///
    /// # Errors
    ///
    /// Only fails if the response cannot be written.
    pub async fn serve_pull<W>(&self, body: &[u8], mut writer: W) -> io::Result<Response>
    where
        W: AsyncWrite + Unpin,
    {
        let handler = self.handler.clone();
        let body = body.to_vec();
        let response = tokio::task::spawn_blocking(move || handler.handle_pull_json(&body))
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "pull task failed");
                Response::ProtocolFailure
            });

        write_response(&mut writer, &response).await?;
        Ok(response)
    }

    async fn read_authority<R>(&self, reader: &mut R) -> io::Result<Authority>
    where
        R: AsyncRead + Unpin,
    {
        let raw = reader.read_i32_le().await?;
        let len = frame_len(raw, MAX_AUTHORITY_BYTES)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut frame = vec![0u8; len];
        reader.read_exact(&mut frame).await?;
        Authority::from_json(&frame).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    async fn read_and_push<R>(&self, authority: Authority, reader: &mut R) -> Response
    where
        R: AsyncRead + Unpin,
    {
        let limit = self.context.config.max_push_bytes;
        let mut body = Vec::new();
        let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
        if let Err(e) = reader.take(cap).read_to_end(&mut body).await {
            debug!(error = %e, "push body read failed");
            return Response::ProtocolFailure;
        }
        if body.len() > limit {
            debug!(limit, project = %authority.project_name, "push exceeds size limit");
            return Response::ProtocolFailure;
        }

        let handler = self.handler.clone();
        tokio::task::spawn_blocking(move || handler.handle_push_body(authority, body))
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "push task failed");
                Response::ProtocolFailure
            })
    }
}

async fn write_response<W>(writer: &mut W, response: &Response) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = match response.encode() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "response could not be encoded");
            Response::ProtocolFailure
                .encode()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        }
    };
    writer.write_all(&bytes).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use depot_protocol::{Archive, Commit, FileDiff, PullRequest, PushRequest};
    use depot_storage::InMemoryStore;

    fn server(dir: &std::path::Path) -> SyncServer {
        let config = ServerConfig::new(dir)
            .with_max_push_bytes(1024)
            .with_project(ProjectConfig::new("demo", ["secret"]));
        SyncServer::new(config, Arc::new(InMemoryStore::new()))
    }

    fn push_bytes(token: &str, payload: &str) -> Vec<u8> {
        let mut archive = Archive::new();
        archive.insert("a.txt", payload.to_string()).unwrap();
        PushRequest::new(
            Authority::new("demo", token, "sam"),
            Commit::new("add a", vec![FileDiff::add("a.txt", 1)]),
            "{}",
            archive,
        )
        .encode()
        .unwrap()
        .to_vec()
    }

    #[test]
    fn server_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        assert_eq!(server.head("demo").unwrap(), 0);
        assert!(server.context().locks.is_empty());
    }

    #[tokio::test]
    async fn push_over_a_stream() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let request = push_bytes("secret", "hello");
        let mut reply = Vec::new();
        let response = server.serve_push(&request[..], &mut reply).await.unwrap();

        assert_eq!(response, Response::Pushed { commit_id: 1 });
        assert_eq!(Response::decode_push(reply).unwrap(), response);
        assert_eq!(server.head("demo").unwrap(), 1);
    }

    #[tokio::test]
    async fn unauthorized_push_is_refused_before_the_body() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let request = push_bytes("wrong", "hello");
        let mut reply = Vec::new();
        let response = server.serve_push(&request[..], &mut reply).await.unwrap();
        assert_eq!(response, Response::ProjectNotFound);
    }

    #[tokio::test]
    async fn oversized_push_is_a_protocol_failure() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let request = push_bytes("secret", &"x".repeat(4096));
        let mut reply = Vec::new();
        let response = server.serve_push(&request[..], &mut reply).await.unwrap();
        assert_eq!(response, Response::ProtocolFailure);
        assert_eq!(server.head("demo").unwrap(), 0);
    }

    #[tokio::test]
    async fn truncated_push_is_a_protocol_failure() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let mut reply = Vec::new();
        let response = server.serve_push(&[7u8, 0][..], &mut reply).await.unwrap();
        assert_eq!(response, Response::ProtocolFailure);
    }

    #[tokio::test]
    async fn pull_over_a_stream() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        let mut sink = Vec::new();
        server
            .serve_push(&push_bytes("secret", "hello")[..], &mut sink)
            .await
            .unwrap();

        let body = PullRequest::new(Authority::new("demo", "secret", "sam"), 0)
            .to_json()
            .unwrap();
        let mut reply = Vec::new();
        server.serve_pull(&body, &mut reply).await.unwrap();

        match Response::decode_pull(reply).unwrap() {
            Response::Pulled { head, archive } => {
                assert_eq!(head, 1);
                assert_eq!(archive.extract("a.txt").unwrap().as_ref(), b"hello");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
