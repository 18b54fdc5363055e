//! SFTP subsystem handler backed by a [`ContentProvider`]
//!
//! One handler exists per SFTP channel. The provider is shared by every
//! session on the same mock host, so uploads from one connection are visible
//! to the next.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};
use tracing::{debug, trace};

use crate::domain::{ContentProvider, Entry, canonical_path};
use crate::error::MockError;

pub(crate) type SharedProvider = Arc<Mutex<ContentProvider>>;

const DIR_MODE: u32 = 0o040_755;
const FILE_MODE: u32 = 0o100_644;

enum OpenHandle {
    Dir { path: String, listed: bool },
    File { path: String, append: bool },
}

pub(crate) struct SftpHandler {
    hostname: Arc<str>,
    provider: SharedProvider,
    handles: HashMap<String, OpenHandle>,
    next_handle: u64,
}

impl SftpHandler {
    pub(crate) fn new(hostname: Arc<str>, provider: SharedProvider) -> Self {
        Self {
            hostname,
            provider,
            handles: HashMap::new(),
            next_handle: 0,
        }
    }

    fn provider(&self) -> MutexGuard<'_, ContentProvider> {
        self.provider.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate(&mut self, handle: OpenHandle) -> String {
        self.next_handle += 1;
        let id = format!("h{}", self.next_handle);
        self.handles.insert(id.clone(), handle);
        id
    }

    fn file_path(&self, handle: &str) -> Result<(String, bool), StatusCode> {
        match self.handles.get(handle) {
            Some(OpenHandle::File { path, append }) => Ok((path.clone(), *append)),
            Some(OpenHandle::Dir { .. }) | None => Err(StatusCode::Failure),
        }
    }

    fn attrs_for(&self, path: &str) -> Result<FileAttributes, StatusCode> {
        let provider = self.provider();
        let entry = provider.resolve(path).map_err(|e| status_code(&e))?;
        Ok(attributes(entry.is_dir(), entry.size()))
    }

    /// Only a size change has an effect; ownership, mode and times are
    /// accepted and ignored.
    fn apply_attrs(&self, path: &str, attrs: &FileAttributes) -> Result<(), StatusCode> {
        let mut provider = self.provider();
        let is_dir = provider.resolve(path).map_err(|e| status_code(&e))?.is_dir();
        if let (false, Some(size)) = (is_dir, attrs.size) {
            provider.truncate(path, size).map_err(|e| status_code(&e))?;
        }
        Ok(())
    }
}

fn ok_status(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

fn status_code(err: &MockError) -> StatusCode {
    match err {
        MockError::NotFound { .. } => StatusCode::NoSuchFile,
        _ => StatusCode::Failure,
    }
}

fn attributes(is_dir: bool, size: u64) -> FileAttributes {
    let mut attrs = FileAttributes::empty();
    attrs.size = Some(size);
    attrs.permissions = Some(if is_dir { DIR_MODE } else { FILE_MODE });
    attrs
}

impl russh_sftp::server::Handler for SftpHandler {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        debug!(host = %self.hostname, version, "SFTP session initialized");
        Ok(Version::new())
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        Ok(Name {
            id,
            files: vec![File::dummy(canonical_path(&path))],
        })
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        trace!(host = %self.hostname, path = %path, "opendir");
        let is_dir = {
            let provider = self.provider();
            let entry = provider.resolve(&path).map_err(|e| status_code(&e))?;
            entry.is_dir()
        };
        if !is_dir {
            return Err(StatusCode::Failure);
        }
        let handle = self.allocate(OpenHandle::Dir {
            path,
            listed: false,
        });
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let path = match self.handles.get_mut(&handle) {
            Some(OpenHandle::Dir { listed: true, .. }) => return Err(StatusCode::Eof),
            Some(OpenHandle::Dir { path, listed }) => {
                *listed = true;
                path.clone()
            }
            Some(OpenHandle::File { .. }) | None => return Err(StatusCode::Failure),
        };

        let entries = self.provider().list(&path).map_err(|e| status_code(&e))?;
        let files = entries
            .into_iter()
            .map(|entry| File::new(entry.name, attributes(entry.is_dir, entry.size)))
            .collect();
        Ok(Name { id, files })
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        trace!(host = %self.hostname, path = %filename, flags = ?pflags, "open");
        {
            let mut provider = self.provider();
            let exists = provider.exists(&filename);
            if pflags.contains(OpenFlags::CREATE) {
                if exists && pflags.contains(OpenFlags::EXCLUDE) {
                    return Err(StatusCode::Failure);
                }
                provider
                    .create_file(&filename, pflags.contains(OpenFlags::TRUNCATE))
                    .map_err(|e| status_code(&e))?;
            } else {
                match provider.resolve(&filename) {
                    Ok(Entry::File(_)) => {}
                    Ok(Entry::Dir(_)) => return Err(StatusCode::Failure),
                    Err(e) => return Err(status_code(&e)),
                }
                if pflags.contains(OpenFlags::TRUNCATE) && pflags.contains(OpenFlags::WRITE) {
                    provider
                        .truncate(&filename, 0)
                        .map_err(|e| status_code(&e))?;
                }
            }
        }

        let handle = self.allocate(OpenHandle::File {
            path: filename,
            append: pflags.contains(OpenFlags::APPEND),
        });
        Ok(Handle { id, handle })
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let (path, _) = self.file_path(&handle)?;
        let bytes = self.provider().read(&path).map_err(|e| status_code(&e))?;

        let start = usize::try_from(offset).map_err(|_| StatusCode::Eof)?;
        if start >= bytes.len() {
            return Err(StatusCode::Eof);
        }
        let end = start.saturating_add(len as usize).min(bytes.len());
        Ok(Data {
            id,
            data: bytes[start..end].to_vec(),
        })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let (path, append) = self.file_path(&handle)?;
        let mut provider = self.provider();
        let offset = if append {
            provider.size(&path).map_err(|e| status_code(&e))?
        } else {
            offset
        };
        provider
            .write_at(&path, offset, &data)
            .map_err(|e| status_code(&e))?;
        Ok(ok_status(id))
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        if self.handles.remove(&handle).is_none() {
            return Err(StatusCode::Failure);
        }
        Ok(ok_status(id))
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let attrs = self.attrs_for(&path)?;
        Ok(Attrs { id, attrs })
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let attrs = self.attrs_for(&path)?;
        Ok(Attrs { id, attrs })
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let path = match self.handles.get(&handle) {
            Some(OpenHandle::File { path, .. } | OpenHandle::Dir { path, .. }) => path.clone(),
            None => return Err(StatusCode::Failure),
        };
        let attrs = self.attrs_for(&path)?;
        Ok(Attrs { id, attrs })
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        self.apply_attrs(&path, &attrs)?;
        Ok(ok_status(id))
    }

    async fn fsetstat(
        &mut self,
        id: u32,
        handle: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let path = match self.handles.get(&handle) {
            Some(OpenHandle::File { path, .. } | OpenHandle::Dir { path, .. }) => path.clone(),
            None => return Err(StatusCode::Failure),
        };
        self.apply_attrs(&path, &attrs)?;
        Ok(ok_status(id))
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        debug!(host = %self.hostname, path = %path, "mkdir");
        self.provider().mkdir(&path).map_err(|e| status_code(&e))?;
        Ok(ok_status(id))
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        debug!(host = %self.hostname, path = %path, "rmdir");
        self.provider().rmdir(&path).map_err(|e| status_code(&e))?;
        Ok(ok_status(id))
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        debug!(host = %self.hostname, path = %filename, "remove");
        self.provider()
            .remove(&filename)
            .map_err(|e| status_code(&e))?;
        Ok(ok_status(id))
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        debug!(host = %self.hostname, from = %oldpath, to = %newpath, "rename");
        self.provider()
            .rename(&oldpath, &newpath)
            .map_err(|e| status_code(&e))?;
        Ok(ok_status(id))
    }
}
