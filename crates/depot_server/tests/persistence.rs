//! History and trees survive a server restart.

use depot_protocol::{Archive, Commit, CommitRecord, FileDiff, Response};
use depot_server::{apply_commit, ApplyIntent, ProjectConfig, ServerConfig, ServerError, SyncServer};
use depot_testkit::prelude::*;
use std::fs;

fn config(dir: &std::path::Path) -> ServerConfig {
    ServerConfig::new(dir).with_project(ProjectConfig::new(TEST_PROJECT, [TEST_TOKEN]))
}

#[test]
fn reopened_server_continues_history() {
    let dir = tempfile::tempdir().unwrap();

    {
        let server = SyncServer::open(config(dir.path())).unwrap();
        let handler = server.handler();
        assert_eq!(
            handler.handle_push_bytes(PushBuilder::new().add("a.txt", 1, "v1").encode()),
            Response::Pushed { commit_id: 1 }
        );
        assert_eq!(
            handler.handle_push_bytes(PushBuilder::new().modify("a.txt", 2, "v2").encode()),
            Response::Pushed { commit_id: 2 }
        );
    }

    let server = SyncServer::open(config(dir.path())).unwrap();
    assert_eq!(server.head(TEST_PROJECT).unwrap(), 2);

    let response = server
        .handler()
        .handle_push_bytes(PushBuilder::new().modify("a.txt", 3, "v3").encode());
    assert_eq!(response, Response::Pushed { commit_id: 3 });

    // Versions recorded before the restart are still enforced.
    let stale = server
        .handler()
        .handle_push_bytes(PushBuilder::new().modify("a.txt", 2, "old").encode());
    assert_eq!(stale, Response::UpdateFailed);

    let (head, archive) = expect_pulled(server.handler().handle_pull_json(&pull_body(
        TEST_PROJECT,
        TEST_TOKEN,
        1,
    )));
    assert_eq!(head, 3);
    assert_eq!(archive.extract("a.txt").unwrap().as_ref(), b"v3");
}

#[test]
fn second_server_on_the_same_data_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let _first = SyncServer::open(config(dir.path())).unwrap();

    assert!(matches!(
        SyncServer::open(config(dir.path())),
        Err(ServerError::Ledger(_))
    ));
}

#[test]
fn invalid_settings_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let bad = ServerConfig::new(dir.path()).with_project(ProjectConfig::new("../escape", ["t"]));
    assert!(matches!(SyncServer::open(bad), Err(ServerError::Config(_))));
}

#[test]
fn settings_file_drives_the_server() {
    let dir = tempfile::tempdir().unwrap();
    let settings = dir.path().join("serversettings.json");
    let data = dir.path().join("data");
    std::fs::write(
        &settings,
        serde_json::json!({
            "DataDir": &data,
            "Projects": [{"Name": TEST_PROJECT, "AccessTokens": [TEST_TOKEN]}]
        })
        .to_string(),
    )
    .unwrap();

    let server = SyncServer::open(ServerConfig::load(&settings).unwrap()).unwrap();
    let response = server
        .handler()
        .handle_push_bytes(PushBuilder::new().add("a.txt", 1, "x").encode());
    assert_eq!(response, Response::Pushed { commit_id: 1 });
    assert!(data.join("projects/demo/a.txt").is_file());
    assert!(data.join("ledger").is_dir());
}

/// Pushes `a.txt`, then applies a second commit and stops as if the process
/// died before deciding its outcome. `record` also appends the commit first.
fn crash_mid_apply(dir: &std::path::Path, record: bool) {
    let server = SyncServer::open(config(dir)).unwrap();
    assert_eq!(
        server
            .handler()
            .handle_push_bytes(PushBuilder::new().add("a.txt", 1, "v1").encode()),
        Response::Pushed { commit_id: 1 }
    );

    let commit = Commit::new(
        "interrupted",
        vec![FileDiff::modify("a.txt", 2), FileDiff::add("b/c.txt", 1)],
    );
    let mut archive = Archive::new();
    archive.insert("a.txt", "v2").unwrap();
    archive.insert("b/c.txt", "c").unwrap();

    let context = server.context();
    let guard = apply_commit(
        &context.tree(TEST_PROJECT).unwrap(),
        &context.config.scratch_dir(),
        &ApplyIntent::new(TEST_PROJECT, 2),
        &commit,
        &archive,
    )
    .unwrap();
    if record {
        context
            .ledger
            .append_record(TEST_PROJECT, &CommitRecord::from_commit(2, &commit))
            .unwrap();
    }
    std::mem::forget(guard);
}

fn scratch_entries(dir: &std::path::Path) -> usize {
    fs::read_dir(dir.join("scratch")).unwrap().count()
}

#[test]
fn interrupted_apply_is_undone_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    crash_mid_apply(dir.path(), false);
    assert_eq!(scratch_entries(dir.path()), 1);

    let server = SyncServer::open(config(dir.path())).unwrap();
    assert_eq!(scratch_entries(dir.path()), 0);
    assert_eq!(server.head(TEST_PROJECT).unwrap(), 1);

    let tree = server.context().tree(TEST_PROJECT).unwrap();
    assert_eq!(tree.files().unwrap(), vec!["a.txt"]);
    assert_eq!(tree.read("a.txt").unwrap(), b"v1");

    let response = server
        .handler()
        .handle_push_bytes(PushBuilder::new().modify("a.txt", 2, "v2").encode());
    assert_eq!(response, Response::Pushed { commit_id: 2 });
}

#[test]
fn recorded_apply_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    crash_mid_apply(dir.path(), true);

    let server = SyncServer::open(config(dir.path())).unwrap();
    assert_eq!(scratch_entries(dir.path()), 0);
    assert_eq!(server.head(TEST_PROJECT).unwrap(), 2);

    let tree = server.context().tree(TEST_PROJECT).unwrap();
    assert_eq!(tree.files().unwrap(), vec!["a.txt", "b/c.txt"]);
    assert_eq!(tree.read("a.txt").unwrap(), b"v2");
}
