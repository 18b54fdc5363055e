mod client;
pub mod connector;
mod sftp;

pub use client::{AuthMethod, ConnectOptions, SshClient};
pub use sftp::{RemoteDirEntry, RemoteMetadata, SftpClient};
