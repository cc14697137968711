//! Push/pull requests and the server's response set.

use crate::archive::Archive;
use crate::error::{ProtocolError, ProtocolResult};
use crate::framing::{put_frame, put_status, FrameReader};
use crate::model::{Authority, Commit};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

const PROJECT_NOT_FOUND: &str = "Failed - project not found!";
const PROTOCOL_FAILURE: &str = "Failed - invalid protocol/connection error!";
const UPDATE_FAILED: &str = "#RESTORE Failed - error when updating project!";
const NOTHING_TO_PULL: &str = "No files to download.";
const DONE: &str = "Done!";

/// A decoded push request.
///
/// Wire layout: `[len][authority][len][commit][len][file map][archive...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PushRequest {
    /// Who is pushing.
    pub authority: Authority,
    /// The validated commit.
    pub commit: Commit,
    /// Client's full file map, kept verbatim.
    pub file_map: String,
    /// File bytes referenced by the commit.
    pub archive: Archive,
}

impl PushRequest {
    /// Creates a new push request.
    pub fn new(authority: Authority, commit: Commit, file_map: impl Into<String>, archive: Archive) -> Self {
        Self {
            authority,
            commit,
            file_map: file_map.into(),
            archive,
        }
    }

    /// Encodes the request in push wire format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or a frame is too large.
    pub fn encode(&self) -> ProtocolResult<Bytes> {
        let mut buf = BytesMut::new();
        put_frame(&mut buf, &self.authority.to_json()?)?;
        put_frame(&mut buf, &self.commit.to_json()?)?;
        put_frame(&mut buf, self.file_map.as_bytes())?;
        self.archive.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decodes a complete push request.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] for any framing or schema violation.
    pub fn decode(bytes: impl Into<Bytes>) -> ProtocolResult<Self> {
        let mut reader = FrameReader::new(bytes);
        let authority = Authority::from_json(&reader.read_frame()?)?;
        Self::decode_body(authority, &mut reader)
    }

    /// Decodes everything after the authority frame.
    ///
    /// Servers read and check the authority first so that unauthorized
    /// callers are rejected before the archive is buffered.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] for any framing or schema violation.
    pub fn decode_body(authority: Authority, reader: &mut FrameReader) -> ProtocolResult<Self> {
        let commit = Commit::from_json(&reader.read_frame()?)?;

        let file_map = reader.read_string("file map")?;
        serde_json::from_str::<serde_json::Value>(&file_map)?;

        let archive = Archive::decode_from(reader)?;
        if reader.remaining() != 0 {
            return Err(ProtocolError::TrailingBytes(reader.remaining()));
        }

        Ok(Self {
            authority,
            commit,
            file_map,
            archive,
        })
    }
}

/// A pull request: everything after `commit_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PullRequest {
    /// Who is pulling.
    pub authority: Authority,
    /// Last commit the client already has; 0 for none.
    pub commit_id: i64,
}

impl PullRequest {
    /// Creates a new pull request.
    pub fn new(authority: Authority, commit_id: u32) -> Self {
        Self {
            authority,
            commit_id: i64::from(commit_id),
        }
    }

    /// Parses and validates a pull request from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON or a `CommitId` outside `0..=u32::MAX`.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        let request: PullRequest = serde_json::from_slice(bytes)?;
        request.since()?;
        Ok(request)
    }

    /// Serializes to JSON.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Returns the validated commit id to pull after.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is negative or too large.
    pub fn since(&self) -> ProtocolResult<u32> {
        u32::try_from(self.commit_id).map_err(|_| {
            ProtocolError::invalid_field("CommitId", format!("{} is out of range", self.commit_id))
        })
    }
}

/// Every reply the server can send.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Unknown project or wrong token (deliberately indistinguishable).
    ProjectNotFound,
    /// Malformed request or transport failure.
    ProtocolFailure,
    /// Apply or ledger failure; the project was rolled back.
    UpdateFailed,
    /// Push accepted.
    Pushed {
        /// Id assigned to the new commit.
        commit_id: u32,
    },
    /// Nothing newer than the client's commit.
    NothingToPull,
    /// Composite of everything newer than the client's commit.
    Pulled {
        /// Id of the newest commit included.
        head: u32,
        /// Net file contents and delete markers.
        archive: Archive,
    },
}

impl Response {
    /// Returns the status line of this response.
    pub fn status(&self) -> &'static str {
        match self {
            Response::ProjectNotFound => PROJECT_NOT_FOUND,
            Response::ProtocolFailure => PROTOCOL_FAILURE,
            Response::UpdateFailed => UPDATE_FAILED,
            Response::NothingToPull => NOTHING_TO_PULL,
            Response::Pushed { .. } | Response::Pulled { .. } => DONE,
        }
    }

    /// Returns true for `Pushed` and `Pulled`.
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Pushed { .. } | Response::Pulled { .. })
    }

    /// Encodes the response.
    ///
    /// # Errors
    ///
    /// Returns an error if an id or archive does not fit the wire format.
    pub fn encode(&self) -> ProtocolResult<Bytes> {
        let mut buf = BytesMut::new();
        put_status(&mut buf, self.status());

        match self {
            Response::Pushed { commit_id } => {
                buf.put_i32_le(wire_id(*commit_id)?);
            }
            Response::Pulled { head, archive } => {
                buf.put_i32_le(wire_id(*head)?);
                archive.encode_into(&mut buf)?;
            }
            _ => {}
        }

        Ok(buf.freeze())
    }

    /// Decodes a reply to a push request.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown status lines or malformed payloads.
    pub fn decode_push(bytes: impl Into<Bytes>) -> ProtocolResult<Self> {
        let mut reader = FrameReader::new(bytes);
        let status = reader.read_status()?;
        let response = match Self::failure(&status) {
            Some(failure) => failure,
            None if status == DONE => Response::Pushed {
                commit_id: read_id(&mut reader)?,
            },
            None => return Err(ProtocolError::UnknownResponse(status)),
        };
        reader.finish()?;
        Ok(response)
    }

    /// Decodes a reply to a pull request.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown status lines or malformed payloads.
    pub fn decode_pull(bytes: impl Into<Bytes>) -> ProtocolResult<Self> {
        let mut reader = FrameReader::new(bytes);
        let status = reader.read_status()?;
        let response = match Self::failure(&status) {
            Some(failure) => failure,
            None if status == DONE => {
                let head = read_id(&mut reader)?;
                let archive = Archive::decode_from(&mut reader)?;
                Response::Pulled { head, archive }
            }
            None => return Err(ProtocolError::UnknownResponse(status)),
        };
        reader.finish()?;
        Ok(response)
    }

    fn failure(status: &str) -> Option<Self> {
        match status {
            PROJECT_NOT_FOUND => Some(Response::ProjectNotFound),
            PROTOCOL_FAILURE => Some(Response::ProtocolFailure),
            UPDATE_FAILED => Some(Response::UpdateFailed),
            NOTHING_TO_PULL => Some(Response::NothingToPull),
            _ => None,
        }
    }
}

fn wire_id(id: u32) -> ProtocolResult<i32> {
    i32::try_from(id).map_err(|_| ProtocolError::invalid_field("CommitId", format!("{id} exceeds i32")))
}

fn read_id(reader: &mut FrameReader) -> ProtocolResult<u32> {
    let raw = reader.read_i32()?;
    u32::try_from(raw).map_err(|_| ProtocolError::invalid_field("CommitId", format!("{raw} is negative")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileDiff;

    fn authority() -> Authority {
        Authority::new("demo", "secret", "sam")
    }

    #[test]
    fn push_request_survives_the_wire() {
        let mut archive = Archive::new();
        archive.insert("a.txt", "hello").unwrap();
        let request = PushRequest::new(
            authority(),
            Commit::new("init", vec![FileDiff::add("a.txt", 1)]),
            r#"{"a.txt": 1}"#,
            archive,
        );

        let decoded = PushRequest::decode(request.encode().unwrap()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn push_file_map_must_be_json() {
        let request = PushRequest::new(
            authority(),
            Commit::new("init", vec![FileDiff::add("a.txt", 1)]),
            "not json",
            Archive::new(),
        );
        assert!(matches!(
            PushRequest::decode(request.encode().unwrap()),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn push_authority_frame_must_be_json() {
        let mut buf = BytesMut::new();
        put_frame(&mut buf, b"{oops").unwrap();
        assert!(matches!(
            PushRequest::decode(buf.freeze()),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn pull_request_json() {
        let json = br#"{"Authority": {"ProjectName": "demo", "AccessToken": "secret", "Username": "sam"}, "CommitId": 3}"#;
        let request = PullRequest::from_json(json).unwrap();
        assert_eq!(request.authority, authority());
        assert_eq!(request.since().unwrap(), 3);
    }

    #[test]
    fn pull_request_rejects_negative_commit() {
        let json = br#"{"Authority": {"ProjectName": "demo", "AccessToken": "secret", "Username": "sam"}, "CommitId": -1}"#;
        assert!(matches!(
            PullRequest::from_json(json),
            Err(ProtocolError::InvalidField { field: "CommitId", .. })
        ));
    }

    #[test]
    fn pull_request_requires_authority() {
        assert!(PullRequest::from_json(br#"{"CommitId": 0}"#).is_err());
    }

    #[test]
    fn pushed_response_layout() {
        let bytes = Response::Pushed { commit_id: 1 }.encode().unwrap();
        assert_eq!(&bytes[..], b"\x05Done!\x01\x00\x00\x00");
        assert_eq!(
            Response::decode_push(bytes).unwrap(),
            Response::Pushed { commit_id: 1 }
        );
    }

    #[test]
    fn failure_responses_are_status_only() {
        for response in [
            Response::ProjectNotFound,
            Response::ProtocolFailure,
            Response::UpdateFailed,
            Response::NothingToPull,
        ] {
            let bytes = response.encode().unwrap();
            let mut expected = vec![response.status().len() as u8];
            expected.extend_from_slice(response.status().as_bytes());
            assert_eq!(&bytes[..], &expected[..]);
            assert_eq!(Response::decode_pull(bytes).unwrap(), response);
        }
    }

    #[test]
    fn pulled_response_carries_archive() {
        let mut archive = Archive::new();
        archive.insert("a.txt", "hello").unwrap();
        archive.mark_deleted("b.txt").unwrap();
        let response = Response::Pulled { head: 7, archive };

        let decoded = Response::decode_pull(response.encode().unwrap()).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut buf = BytesMut::new();
        put_status(&mut buf, "Maybe?");
        assert!(matches!(
            Response::decode_push(buf.freeze()),
            Err(ProtocolError::UnknownResponse(_))
        ));
    }
}
