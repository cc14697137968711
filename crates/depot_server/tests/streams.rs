//! Push and pull over async byte streams.

use depot_protocol::Response;
use depot_testkit::prelude::*;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn push_and_pull_over_duplex_streams() {
    let server = Arc::new(TestServer::new());

    let (mut client, server_side) = tokio::io::duplex(1024);
    let task = {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let (reader, writer) = tokio::io::split(server_side);
            server.serve_push(reader, writer).await
        })
    };

    let request = PushBuilder::new().add("a.txt", 1, "hello").encode();
    client.write_all(&request).await.unwrap();
    client.shutdown().await.unwrap();

    let mut reply = Vec::new();
    client.read_to_end(&mut reply).await.unwrap();
    let sent = task.await.unwrap().unwrap();

    assert_eq!(sent, Response::Pushed { commit_id: 1 });
    assert_eq!(Response::decode_push(reply).unwrap(), sent);

    let mut reply = Vec::new();
    server
        .serve_pull(&pull_body(TEST_PROJECT, TEST_TOKEN, 0), &mut reply)
        .await
        .unwrap();
    let (head, archive) = expect_pulled(Response::decode_pull(reply).unwrap());
    assert_eq!(head, 1);
    assert_eq!(archive.extract("a.txt").unwrap().as_ref(), b"hello");
}

#[tokio::test]
async fn refused_push_replies_without_reading_the_archive() {
    let server = Arc::new(TestServer::new());

    // Only the authority frame is sent; the stream stays open.
    let (mut client, server_side) = tokio::io::duplex(64 * 1024);
    let task = {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let (reader, writer) = tokio::io::split(server_side);
            server.serve_push(reader, writer).await
        })
    };

    let authority = br#"{"ProjectName":"nope","AccessToken":"x","Username":"eve"}"#;
    client
        .write_all(&(authority.len() as i32).to_le_bytes())
        .await
        .unwrap();
    client.write_all(authority).await.unwrap();

    let sent = task.await.unwrap().unwrap();
    assert_eq!(sent, Response::ProjectNotFound);

    let mut reply = Vec::new();
    client.read_to_end(&mut reply).await.unwrap();
    assert_eq!(reply, Response::ProjectNotFound.encode().unwrap().to_vec());
}

#[tokio::test]
async fn responses_are_byte_identical_for_refusals() {
    let server = TestServer::new();

    let mut unknown = Vec::new();
    server
        .serve_pull(&pull_body("missing", TEST_TOKEN, 0), &mut unknown)
        .await
        .unwrap();
    let mut wrong = Vec::new();
    server
        .serve_pull(&pull_body(TEST_PROJECT, "wrong", 0), &mut wrong)
        .await
        .unwrap();

    assert_eq!(unknown, wrong);
    assert_eq!(Response::decode_pull(unknown).unwrap(), Response::ProjectNotFound);
}

#[tokio::test]
async fn garbage_gets_a_protocol_failure() {
    let server = TestServer::new();

    let mut reply = Vec::new();
    let sent = server
        .serve_push(&b"\xff\xff\xff\xffgarbage"[..], &mut reply)
        .await
        .unwrap();
    assert_eq!(sent, Response::ProtocolFailure);

    let mut reply = Vec::new();
    let sent = server.serve_pull(b"{]", &mut reply).await.unwrap();
    assert_eq!(sent, Response::ProtocolFailure);
    assert_eq!(Response::decode_pull(reply).unwrap(), Response::ProtocolFailure);
}

#[tokio::test]
async fn empty_project_pull_says_nothing_to_download() {
    let server = TestServer::new();
    let mut reply = Vec::new();
    server
        .serve_pull(&pull_body(TEST_PROJECT, TEST_TOKEN, 0), &mut reply)
        .await
        .unwrap();
    assert_eq!(reply[0] as usize, reply.len() - 1);
    assert_eq!(&reply[1..], b"No files to download.");
}
