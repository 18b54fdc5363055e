//! SFTP client
//!
//! Thin async wrapper over russh-sftp's `SftpSession` with whole-file and
//! streaming transfers plus the usual directory operations.

use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{MockError, Result};

/// Validate that a path doesn't contain path traversal components.
fn validate_remote_path(path: &str) -> Result<()> {
    if path.split('/').any(|component| component == "..") {
        return Err(MockError::FileTransfer {
            reason: "Path traversal ('..') is not allowed in remote paths".to_string(),
        });
    }
    Ok(())
}

fn join_remote(dir: &str, name: &str) -> String {
    if dir.is_empty() || dir == "." {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Entry in a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDirEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: Option<u64>,
    pub permissions: Option<u32>,
}

/// Attributes of a single remote path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub is_dir: bool,
    pub size: Option<u64>,
    pub permissions: Option<u32>,
}

/// SFTP client wrapper for file transfers
pub struct SftpClient {
    session: SftpSession,
}

impl SftpClient {
    /// Create a new SFTP client from a session
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // SftpSession is not const-compatible
    pub fn new(session: SftpSession) -> Self {
        Self { session }
    }

    /// Names in a remote directory, in server order
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read.
    pub async fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        Ok(self
            .read_dir(path)
            .await?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }

    /// List entries in a remote directory
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read.
    pub async fn read_dir(&self, path: &str) -> Result<Vec<RemoteDirEntry>> {
        validate_remote_path(path)?;
        let entries = self.session.read_dir(path).await.map_err(sftp_error)?;

        let mut result = Vec::new();
        for entry in entries {
            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            let metadata = entry.metadata();
            let is_dir = entry.file_type().is_dir();
            result.push(RemoteDirEntry {
                path: join_remote(path, &name),
                name,
                is_dir,
                size: metadata.size,
                permissions: metadata.permissions,
            });
        }

        Ok(result)
    }

    /// Read a whole remote file into memory
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or read.
    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.download_to(path, &mut buffer).await?;
        Ok(buffer)
    }

    /// Stream a remote file into `writer`, returning the byte count
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, read or written out.
    pub async fn download_to<W>(&self, path: &str, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        validate_remote_path(path)?;
        let mut file = self.session.open(path).await.map_err(sftp_error)?;

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)
            .await
            .map_err(|e| MockError::FileTransfer {
                reason: format!("Read error on {path}: {e}"),
            })?;
        writer
            .write_all(&buffer)
            .await
            .map_err(|e| MockError::FileTransfer {
                reason: format!("Write error: {e}"),
            })?;
        writer.flush().await.map_err(|e| MockError::FileTransfer {
            reason: format!("Flush error: {e}"),
        })?;

        Ok(buffer.len() as u64)
    }

    /// Create or replace a remote file with `data`
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub async fn write(&self, path: &str, data: &[u8]) -> Result<u64> {
        let mut reader = data;
        self.upload_from(&mut reader, path).await
    }

    /// Stream `reader` into a remote file, creating or truncating it
    ///
    /// # Errors
    /// Returns an error if the file cannot be created, or on read/write failure.
    pub async fn upload_from<R>(&self, reader: &mut R, path: &str) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        validate_remote_path(path)?;
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| MockError::FileTransfer {
                reason: format!("Read error: {e}"),
            })?;

        let flags = OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE;
        let mut file = self
            .session
            .open_with_flags(path, flags)
            .await
            .map_err(sftp_error)?;
        file.write_all(&buffer)
            .await
            .map_err(|e| MockError::FileTransfer {
                reason: format!("Write error on {path}: {e}"),
            })?;
        file.shutdown().await.map_err(|e| MockError::FileTransfer {
            reason: format!("Close error on {path}: {e}"),
        })?;

        Ok(buffer.len() as u64)
    }

    /// Whether a remote path exists
    ///
    /// # Errors
    /// Returns an error if the server reports something other than "no such file".
    pub async fn exists(&self, path: &str) -> Result<bool> {
        validate_remote_path(path)?;
        self.session.try_exists(path).await.map_err(sftp_error)
    }

    /// Attributes of a remote path
    ///
    /// # Errors
    /// Returns an error if the path does not exist.
    pub async fn metadata(&self, path: &str) -> Result<RemoteMetadata> {
        validate_remote_path(path)?;
        let metadata = self.session.metadata(path).await.map_err(sftp_error)?;
        Ok(RemoteMetadata {
            is_dir: metadata.is_dir(),
            size: metadata.size,
            permissions: metadata.permissions,
        })
    }

    /// Create a single remote directory
    ///
    /// # Errors
    /// Returns an error if the parent is missing or the path already exists.
    pub async fn create_dir(&self, path: &str) -> Result<()> {
        validate_remote_path(path)?;
        self.session.create_dir(path).await.map_err(sftp_error)
    }

    /// Create a directory and all parent directories on the remote host
    ///
    /// # Errors
    /// Returns an error if a directory cannot be created and does not already exist.
    pub async fn mkdir_recursive(&self, path: &str) -> Result<()> {
        validate_remote_path(path)?;
        let mut current = if path.starts_with('/') {
            String::from("/")
        } else {
            String::new()
        };

        for component in path.split('/').filter(|c| !c.is_empty()) {
            current = join_remote(&current, component);

            if self.session.create_dir(current.as_str()).await.is_err()
                && !self
                    .session
                    .try_exists(current.as_str())
                    .await
                    .map_err(sftp_error)?
            {
                return Err(MockError::FileTransfer {
                    reason: format!("Cannot create remote directory: {current}"),
                });
            }
        }

        Ok(())
    }

    /// Remove a remote file
    ///
    /// # Errors
    /// Returns an error if the path is missing or is a directory.
    pub async fn remove_file(&self, path: &str) -> Result<()> {
        validate_remote_path(path)?;
        self.session.remove_file(path).await.map_err(sftp_error)
    }

    /// Remove an empty remote directory
    ///
    /// # Errors
    /// Returns an error if the directory is missing or not empty.
    pub async fn remove_dir(&self, path: &str) -> Result<()> {
        validate_remote_path(path)?;
        self.session.remove_dir(path).await.map_err(sftp_error)
    }

    /// Rename or move a remote path
    ///
    /// # Errors
    /// Returns an error if the source is missing or the destination exists.
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        validate_remote_path(from)?;
        validate_remote_path(to)?;
        self.session.rename(from, to).await.map_err(sftp_error)
    }

    /// Close the SFTP session
    ///
    /// # Errors
    ///
    /// Returns an error if the SFTP session cannot be closed cleanly.
    pub async fn close(self) -> Result<()> {
        self.session.close().await.map_err(sftp_error)
    }
}

/// Convert an SFTP error to a `MockError`
#[expect(clippy::needless_pass_by_value)]
fn sftp_error(e: russh_sftp::client::error::Error) -> MockError {
    MockError::Sftp {
        reason: e.to_string(),
    }
}
