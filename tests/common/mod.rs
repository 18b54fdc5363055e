//! Shared helpers for integration tests

#![allow(dead_code)]

use sftpmock::{ConnectOptions, ConnectTarget, HostContentMap, SftpClient, SshClient, host_contents};

/// Connect through the registry and open an SFTP session.
///
/// The SSH client is returned too; dropping it closes the session.
pub async fn open_sftp(target: impl Into<ConnectTarget>) -> (SshClient, SftpClient) {
    sftpmock::init_test_logging();
    let options = ConnectOptions::password("tester", "any-password");
    let client = SshClient::connect(target, &options)
        .await
        .expect("connect to mock server");
    let sftp = client.sftp_session().await.expect("open sftp subsystem");
    (client, sftp)
}

/// Two hosts with disjoint trees
pub fn two_hosts() -> HostContentMap {
    host_contents! {
        "alpha.example.com" => {
            "a_folder" => { "file.txt" => "x" },
            "other_folder" => {},
        },
        "beta.example.com" => {
            "only_on_beta.txt" => "beta",
        },
    }
}
