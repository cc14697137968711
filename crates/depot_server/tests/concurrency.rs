//! Concurrent pushes and pulls against shared projects.

use depot_protocol::Response;
use depot_server::ProjectConfig;
use depot_testkit::prelude::*;
use std::sync::Arc;
use std::thread;

#[test]
fn concurrent_pushes_get_contiguous_ids() {
    let server = Arc::new(TestServer::new());
    let threads = 8;
    let per_thread = 10;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let server = Arc::clone(&server);
            thread::spawn(move || {
                let mut ids = Vec::new();
                for i in 0..per_thread {
                    let name = format!("t{t}/file{i}.txt");
                    match server.push(PushBuilder::new().add(&name, 1, name.as_bytes())) {
                        Response::Pushed { commit_id } => ids.push(commit_id),
                        other => panic!("push failed: {other:?}"),
                    }
                }
                ids
            })
        })
        .collect();

    let mut ids: Vec<u32> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    ids.sort_unstable();

    let total = (threads * per_thread) as u32;
    assert_eq!(ids, (1..=total).collect::<Vec<_>>());
    assert_eq!(server.head(), total);
    assert_eq!(server.snapshot().len(), total as usize);
}

#[test]
fn pulls_never_observe_a_partial_push() {
    let server = Arc::new(TestServer::new());
    server.push(PushBuilder::new().add("left.txt", 1, "0").add("right.txt", 1, "0"));

    let writer = {
        let server = Arc::clone(&server);
        thread::spawn(move || {
            for version in 2..=40u32 {
                let value = version.to_string();
                let response = server.push(
                    PushBuilder::new()
                        .modify("left.txt", version, &value)
                        .modify("right.txt", version, &value),
                );
                assert!(response.is_success());
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let server = Arc::clone(&server);
            thread::spawn(move || {
                for _ in 0..40 {
                    let (_, archive) = expect_pulled(server.pull(0));
                    let left = archive.extract("left.txt").unwrap();
                    let right = archive.extract("right.txt").unwrap();
                    assert_eq!(left, right, "pull saw half of a push");
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(server.head(), 40);
}

#[test]
fn projects_are_independent() {
    let server = Arc::new(TestServer::with_config(|config| {
        config.with_project(ProjectConfig::new("other", ["other-token"]))
    }));

    let handles: Vec<_> = [(TEST_PROJECT, TEST_TOKEN), ("other", "other-token")]
        .into_iter()
        .map(|(project, token)| {
            let server = Arc::clone(&server);
            thread::spawn(move || {
                for version in 1..=10u32 {
                    let builder = PushBuilder::new().project(project).token(token);
                    let builder = if version == 1 {
                        builder.add("shared.txt", version, project)
                    } else {
                        builder.modify("shared.txt", version, project)
                    };
                    assert_eq!(server.push(builder), Response::Pushed { commit_id: version });
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(server.server.head(TEST_PROJECT).unwrap(), 10);
    assert_eq!(server.server.head("other").unwrap(), 10);
    let other = server.context().tree("other").unwrap();
    assert_eq!(other.read("shared.txt").unwrap(), b"other");
    assert_eq!(server.snapshot().get("shared.txt").unwrap(), TEST_PROJECT.as_bytes());
}
