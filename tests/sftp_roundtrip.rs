//! SFTP Round-Trip Integration Tests
//!
//! Real SSH/SFTP sessions against the in-memory servers: listings, reads,
//! uploads and the mutation requests, observed from the client side and
//! through `ServerHandle::snapshot`.

mod common;

use serial_test::serial;
use sftpmock::domain::{Content, ContentNode};
use sftpmock::{MockError, MockSftpServers, host_contents};

use common::{open_sftp, two_hosts};

// ============== Listing ==============

#[tokio::test]
#[serial]
async fn test_listing_preserves_insertion_order() {
    let mut servers = MockSftpServers::new(two_hosts()).unwrap();
    let scope = servers.enter().unwrap();

    let (client, sftp) = open_sftp("alpha.example.com:22").await;
    assert_eq!(sftp.list_dir(".").await.unwrap(), ["a_folder", "other_folder"]);
    assert_eq!(sftp.list_dir("/a_folder").await.unwrap(), ["file.txt"]);
    assert!(sftp.list_dir("/other_folder").await.unwrap().is_empty());

    drop(sftp);
    client.close().await.unwrap();
    scope.exit().unwrap();
}

#[tokio::test]
#[serial]
async fn test_read_dir_reports_kinds_and_sizes() {
    let mut servers = MockSftpServers::new(host_contents! {
        "files.example.com" => {
            "dir" => {},
            "text.txt" => "four",
            "count" => 12345_i64,
            "blob.bin" => (vec![0u8, 159, 146, 150]),
        },
    })
    .unwrap();
    let scope = servers.enter().unwrap();

    let (_client, sftp) = open_sftp(("files.example.com", 22)).await;
    let entries = sftp.read_dir("/").await.unwrap();

    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["dir", "text.txt", "count", "blob.bin"]);
    assert!(entries[0].is_dir);
    assert_eq!(entries[1].path, "/text.txt");
    assert_eq!(entries[1].size, Some(4));
    assert!(!entries[2].is_dir);
    assert_eq!(entries[2].size, Some(5));
    assert!(!entries[3].is_dir, "binary leaves are files");

    assert_eq!(sftp.read("count").await.unwrap(), b"12345");
    assert_eq!(sftp.read("/blob.bin").await.unwrap(), vec![0u8, 159, 146, 150]);

    drop(sftp);
    scope.exit().unwrap();
}

#[tokio::test]
#[serial]
async fn test_empty_tree_root_is_listable() {
    let mut servers = MockSftpServers::new(host_contents! { "empty.example.com" => {} }).unwrap();
    let scope = servers.enter().unwrap();

    let (_client, sftp) = open_sftp("empty.example.com:22").await;
    assert!(sftp.list_dir(".").await.unwrap().is_empty());
    assert!(sftp.list_dir("/").await.unwrap().is_empty());

    let meta = sftp.metadata("/").await.unwrap();
    assert!(meta.is_dir);

    drop(sftp);
    scope.exit().unwrap();
}

// ============== Upload and Download ==============

#[tokio::test]
#[serial]
async fn test_write_then_read_round_trip() {
    let mut servers = MockSftpServers::new(host_contents! { "empty.example.com" => {} }).unwrap();
    let scope = servers.enter().unwrap();

    let (_client, sftp) = open_sftp("empty.example.com:22").await;
    let written = sftp.write("greeting.txt", b"hello").await.unwrap();
    assert_eq!(written, 5);
    assert_eq!(sftp.read("greeting.txt").await.unwrap(), b"hello");
    assert!(sftp.exists("/greeting.txt").await.unwrap());

    let snapshot = scope.server("empty.example.com").unwrap().snapshot();
    assert_eq!(
        snapshot.get("greeting.txt"),
        Some(&ContentNode::File(Content::Bytes(b"hello".to_vec())))
    );

    drop(sftp);
    scope.exit().unwrap();
}

#[tokio::test]
#[serial]
async fn test_overwrite_truncates_previous_content() {
    let mut servers = MockSftpServers::new(host_contents! {
        "files.example.com" => { "notes.txt" => "a much longer original body" },
    })
    .unwrap();
    let scope = servers.enter().unwrap();

    let (_client, sftp) = open_sftp("files.example.com:22").await;
    sftp.write("notes.txt", b"short").await.unwrap();
    assert_eq!(sftp.read("notes.txt").await.unwrap(), b"short");
    assert_eq!(sftp.metadata("notes.txt").await.unwrap().size, Some(5));

    drop(sftp);
    scope.exit().unwrap();
}

#[tokio::test]
#[serial]
async fn test_streaming_transfers() {
    let mut servers = MockSftpServers::new(host_contents! {
        "files.example.com" => { "in" => { "source.csv" => "id,name\n1,one\n" } },
    })
    .unwrap();
    let scope = servers.enter().unwrap();

    let (_client, sftp) = open_sftp("files.example.com:22").await;

    let mut downloaded = Vec::new();
    let count = sftp.download_to("in/source.csv", &mut downloaded).await.unwrap();
    assert_eq!(count, downloaded.len() as u64);
    assert_eq!(downloaded, b"id,name\n1,one\n");

    let payload = vec![7u8; 100_000];
    let mut reader = payload.as_slice();
    let count = sftp.upload_from(&mut reader, "in/large.bin").await.unwrap();
    assert_eq!(count, 100_000);
    assert_eq!(sftp.read("in/large.bin").await.unwrap(), payload);

    drop(sftp);
    scope.exit().unwrap();
}

#[tokio::test]
#[serial]
async fn test_upload_into_missing_directory_fails() {
    let mut servers = MockSftpServers::new(host_contents! { "empty.example.com" => {} }).unwrap();
    let scope = servers.enter().unwrap();

    let (_client, sftp) = open_sftp("empty.example.com:22").await;
    let err = sftp.write("missing/file.txt", b"data").await.unwrap_err();
    assert!(matches!(err, MockError::Sftp { .. }));

    let err = sftp.read("nothing-here.txt").await.unwrap_err();
    assert!(matches!(err, MockError::Sftp { .. }));
    assert!(!sftp.exists("nothing-here.txt").await.unwrap());

    drop(sftp);
    scope.exit().unwrap();
}

// ============== Directory Mutations ==============

#[tokio::test]
#[serial]
async fn test_mkdir_rename_and_remove() {
    let mut servers = MockSftpServers::new(host_contents! {
        "files.example.com" => { "old.txt" => "payload" },
    })
    .unwrap();
    let scope = servers.enter().unwrap();

    let (_client, sftp) = open_sftp("files.example.com:22").await;

    sftp.mkdir_recursive("/archive/2024/q1").await.unwrap();
    sftp.mkdir_recursive("/archive/2024").await.unwrap();
    assert!(sftp.metadata("/archive/2024/q1").await.unwrap().is_dir);

    sftp.rename("old.txt", "archive/2024/q1/new.txt").await.unwrap();
    assert!(!sftp.exists("old.txt").await.unwrap());
    assert_eq!(
        sftp.read("archive/2024/q1/new.txt").await.unwrap(),
        b"payload"
    );

    assert!(sftp.remove_dir("archive/2024/q1").await.is_err(), "not empty");
    sftp.remove_file("archive/2024/q1/new.txt").await.unwrap();
    sftp.remove_dir("archive/2024/q1").await.unwrap();
    assert_eq!(sftp.list_dir("archive/2024").await.unwrap(), Vec::<String>::new());

    sftp.create_dir("archive/2025").await.unwrap();
    assert!(sftp.create_dir("archive/2025").await.is_err());

    let snapshot = scope.server("files.example.com").unwrap().snapshot();
    let ContentNode::Dir(archive) = &snapshot["archive"] else {
        panic!("archive should be a directory");
    };
    assert_eq!(archive.keys().collect::<Vec<_>>(), ["2024", "2025"]);

    drop(sftp);
    scope.exit().unwrap();
}

#[tokio::test]
#[serial]
async fn test_traversal_paths_rejected_client_side() {
    let mut servers = MockSftpServers::new(host_contents! { "empty.example.com" => {} }).unwrap();
    let scope = servers.enter().unwrap();

    let (_client, sftp) = open_sftp("empty.example.com:22").await;
    let err = sftp.read("../etc/passwd").await.unwrap_err();
    assert!(matches!(err, MockError::FileTransfer { .. }));

    drop(sftp);
    scope.exit().unwrap();
}

// ============== Host Isolation ==============

#[tokio::test]
#[serial]
async fn test_hosts_serve_independent_trees() {
    let mut servers = MockSftpServers::new(two_hosts()).unwrap();
    let scope = servers.enter().unwrap();

    let (_a_client, alpha) = open_sftp("alpha.example.com:22").await;
    let (_b_client, beta) = open_sftp("beta.example.com:2222").await;

    assert_eq!(alpha.list_dir(".").await.unwrap(), ["a_folder", "other_folder"]);
    assert_eq!(beta.list_dir(".").await.unwrap(), ["only_on_beta.txt"]);
    assert!(!alpha.exists("only_on_beta.txt").await.unwrap());
    assert!(!beta.exists("a_folder").await.unwrap());

    alpha.write("from_alpha.txt", b"a").await.unwrap();
    assert!(!beta.exists("from_alpha.txt").await.unwrap());

    drop(alpha);
    drop(beta);
    scope.exit().unwrap();

    let beta_tree = servers.servers()["beta.example.com"].snapshot();
    assert!(!beta_tree.contains_key("from_alpha.txt"));
}
