use thiserror::Error;

#[derive(Error, Debug)]
pub enum MockError {
    // Configuration errors
    /// The configuration as a whole is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid { field: String, reason: String },

    // Server lifecycle errors
    #[error("Mock SFTP server for {host} failed to start: {reason}")]
    ServerStart { host: String, reason: String },

    #[error("Mock SFTP server for {host} failed to stop: {reason}")]
    ServerStop { host: String, reason: String },

    #[error("Scope teardown failed: {}", errors.join("; "))]
    Teardown { errors: Vec<String> },

    #[error("Scope is {actual}, expected {expected}")]
    ScopeState {
        expected: &'static str,
        actual: &'static str,
    },

    // Interception errors
    #[error("Invalid connection target: {reason}")]
    InvalidTarget { reason: String },

    // Content tree errors
    #[error("No such file or directory: {path}")]
    NotFound { path: String },

    #[error("Content error at {path}: {reason}")]
    Content { path: String, reason: String },

    // SSH errors
    #[error("SSH connection failed to {host}: {reason}")]
    SshConnection { host: String, reason: String },

    #[error("SSH authentication failed for {user}@{host}")]
    SshAuth { user: String, host: String },

    #[error("SSH key invalid format: {path}")]
    SshKeyInvalid { path: String },

    #[error("SSH connection timeout after {seconds}s")]
    SshTimeout { seconds: u64 },

    // SFTP errors
    #[error("SFTP error: {reason}")]
    Sftp { reason: String },

    #[error("File transfer error: {reason}")]
    FileTransfer { reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // YAML errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

impl MockError {
    /// Shorthand for a `NotFound` at `path`.
    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Shorthand for a `Content` error at `path`.
    pub(crate) fn content(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Content {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_target(reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MockError>;
