//! Push/pull scenarios through the request handler.

use depot_protocol::{Archive, Response};
use depot_testkit::prelude::*;

#[test]
fn init_delete_scenario() {
    let server = TestServer::new();

    let pushed = server.push(PushBuilder::new().description("init").add("a.txt", 1, "hello"));
    assert_eq!(pushed, Response::Pushed { commit_id: 1 });
    assert_eq!(server.snapshot().get("a.txt").unwrap(), b"hello");

    let (head, archive) = expect_pulled(server.pull(0));
    assert_eq!(head, 1);
    assert_eq!(archive.extract("a.txt").unwrap().as_ref(), b"hello");
    assert_eq!(archive.len(), 1);

    let pushed = server.push(PushBuilder::new().delete("a.txt", 2));
    assert_eq!(pushed, Response::Pushed { commit_id: 2 });
    assert!(server.snapshot().is_empty());

    // Added then deleted: no content, only a harmless delete marker.
    let (head, archive) = expect_pulled(server.pull(0));
    assert_eq!(head, 2);
    assert_eq!(archive.entries().count(), 0);
    assert_eq!(archive.deleted().collect::<Vec<_>>(), vec!["a.txt"]);

    let (head, archive) = expect_pulled(server.pull(1));
    assert_eq!(head, 2);
    assert_eq!(archive.entries().count(), 0);
    assert!(archive.is_deleted("a.txt"));

    assert_eq!(server.pull(2), Response::NothingToPull);
}

#[test]
fn pull_on_empty_project_has_nothing() {
    let server = TestServer::new();
    assert_eq!(server.pull(0), Response::NothingToPull);
    assert_eq!(server.pull(10), Response::NothingToPull);
}

#[test]
fn pull_beyond_head_has_nothing() {
    let server = TestServer::new();
    server.push(PushBuilder::new().add("a.txt", 1, "x"));
    assert_eq!(server.pull(5), Response::NothingToPull);
}

#[test]
fn ids_are_contiguous() {
    let server = TestServer::new();
    for version in 1..=20u32 {
        let builder = if version == 1 {
            PushBuilder::new().add("counter.txt", version, version.to_string())
        } else {
            PushBuilder::new().modify("counter.txt", version, version.to_string())
        };
        assert_eq!(server.push(builder), Response::Pushed { commit_id: version });
    }

    let records = server.context().ledger.range_since(TEST_PROJECT, 0).unwrap();
    let ids: Vec<u32> = records.iter().map(|r| r.commit_id).collect();
    assert_eq!(ids, (1..=20).collect::<Vec<_>>());
    assert_eq!(server.context().ledger.verify(TEST_PROJECT).unwrap(), 20);
}

#[test]
fn pull_sends_current_content_of_modified_files() {
    let server = TestServer::new();
    server.push(PushBuilder::new().add("a.txt", 1, "one").add("b.txt", 1, "b"));
    server.push(PushBuilder::new().modify("a.txt", 2, "two"));
    server.push(PushBuilder::new().modify("a.txt", 3, "three"));

    let (head, archive) = expect_pulled(server.pull(1));
    assert_eq!(head, 3);
    assert_eq!(archive.extract("a.txt").unwrap().as_ref(), b"three");
    assert!(archive.extract("b.txt").is_err());
}

#[test]
fn nested_paths_and_backslashes() {
    let server = TestServer::new();
    let response = server.push(PushBuilder::new().add("assets\\img\\logo.png", 1, [0u8, 1, 2]));
    assert_eq!(response, Response::Pushed { commit_id: 1 });

    let snapshot = server.snapshot();
    assert_eq!(snapshot.get("assets/img/logo.png").unwrap(), &vec![0u8, 1, 2]);

    let (_, archive) = expect_pulled(server.pull(0));
    assert!(archive.extract("assets/img/logo.png").is_ok());
}

#[test]
fn deleting_an_absent_file_succeeds() {
    let server = TestServer::new();
    server.push(PushBuilder::new().add("keep.txt", 1, "k"));
    let before = server.snapshot();

    let response = server.push(PushBuilder::new().delete("never-existed.txt", 1));
    assert_eq!(response, Response::Pushed { commit_id: 2 });
    assert_eq!(server.snapshot(), before);
}

#[test]
fn unknown_project_and_wrong_token_look_the_same() {
    let server = TestServer::new();

    let unknown = server.push(PushBuilder::new().project("missing").add("a.txt", 1, "x"));
    let wrong = server.push(PushBuilder::new().token("guess").add("a.txt", 1, "x"));
    assert_eq!(unknown, Response::ProjectNotFound);
    assert_eq!(unknown.encode().unwrap(), wrong.encode().unwrap());

    let handler = server.handler();
    let unknown = handler.handle_pull_json(&pull_body("missing", TEST_TOKEN, 0));
    let wrong = handler.handle_pull_json(&pull_body(TEST_PROJECT, "guess", 0));
    assert_eq!(unknown.encode().unwrap(), wrong.encode().unwrap());
    assert_eq!(server.head(), 0);
}

#[test]
fn negative_commit_id_is_a_protocol_failure() {
    let server = TestServer::new();
    let response = server
        .handler()
        .handle_pull_json(&pull_body(TEST_PROJECT, TEST_TOKEN, -1));
    assert_eq!(response, Response::ProtocolFailure);
}

#[test]
fn malformed_commit_is_a_protocol_failure() {
    let server = TestServer::new();

    // Empty commits are refused.
    assert_eq!(server.push(PushBuilder::new()), Response::ProtocolFailure);

    // Escaping the project directory is refused.
    let escape = PushBuilder::new().diff(depot_protocol::FileDiff::delete("../outside", 1));
    assert_eq!(server.push(escape), Response::ProtocolFailure);

    // File map must be JSON.
    let bad_map = PushBuilder::new().add("a.txt", 1, "x").file_map("not json");
    assert_eq!(server.push(bad_map), Response::ProtocolFailure);

    assert_eq!(server.head(), 0);
    assert!(server.snapshot().is_empty());
}

#[test]
fn file_map_is_kept_verbatim() {
    let server = TestServer::new();
    let map = r#"{"a.txt": {"Version": 1}}"#;
    server.push(PushBuilder::new().add("a.txt", 1, "x").file_map(map));

    let stored = std::fs::read_to_string(server.data_dir().join("filemaps/demo.json")).unwrap();
    assert_eq!(stored, map);
}

#[test]
fn pulled_archive_survives_the_wire() {
    let server = TestServer::new();
    server.push(PushBuilder::new().add("a.txt", 1, "A").add("b.txt", 1, "B"));
    server.push(PushBuilder::new().delete("b.txt", 2));

    let response = server.pull(0);
    let decoded = Response::decode_pull(response.encode().unwrap()).unwrap();
    assert_eq!(decoded, response);

    let (_, archive) = expect_pulled(decoded);
    let mut expected = Archive::new();
    expected.insert("a.txt", "A").unwrap();
    expected.mark_deleted("b.txt").unwrap();
    assert_eq!(archive, expected);
}
