//! Generated histories pushed through the server leave the tree that a
//! sequential replay predicts, and pulls bring any client up to date.

use depot_protocol::{CommitRecord, Response};
use depot_testkit::prelude::*;
use proptest::prelude::*;

fn push_record(server: &TestServer, record: &CommitRecord) -> Response {
    let mut builder = PushBuilder::new().description(&record.description);
    for diff in &record.files {
        builder = builder.diff(diff.clone());
        if diff.operation.leaves_file() {
            builder = builder.entry(&diff.file_name, content_for(&diff.file_name, diff.version));
        }
    }
    server.push(builder)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn pushed_history_matches_replay(history in history_strategy(12)) {
        let server = TestServer::new();
        for record in &history {
            prop_assert_eq!(
                push_record(&server, record),
                Response::Pushed { commit_id: record.commit_id }
            );
        }

        prop_assert_eq!(server.snapshot(), ModelTree::replay(&history).contents());
        prop_assert_eq!(server.head() as usize, history.len());
    }

    #[test]
    fn pull_brings_a_client_up_to_date((history, since, _) in split_history_strategy(12)) {
        let server = TestServer::new();
        for record in &history {
            prop_assert!(push_record(&server, record).is_success());
        }

        let mut client = ModelTree::replay(&history[..since]).contents();
        match server.pull(since as u32) {
            Response::NothingToPull => prop_assert_eq!(since, history.len()),
            response => {
                let (head, archive) = expect_pulled(response);
                prop_assert_eq!(head as usize, history.len());
                for (name, data) in archive.entries() {
                    client.insert(name.to_string(), data.to_vec());
                }
                for name in archive.deleted() {
                    client.remove(name);
                }
            }
        }

        prop_assert_eq!(client, server.snapshot());
    }
}
