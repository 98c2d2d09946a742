use thiserror::Error;

/// Coarse classification of a [`RegistryError`], used by callers to decide
/// whether an operation may be retried unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input: malformed path, invalid parameter, missing resource.
    User,
    /// Permission denied on a handler-mediated operation.
    Auth,
    /// Backend, configuration or session failure. Potentially transient.
    Server,
    /// Lost a race (path-id allocation, version creation). Safe to retry.
    Concurrency,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Concurrent modification: {0}")]
    Concurrency(String),

    #[error("Failed to resolve {path}: {source}")]
    Resolution {
        path: String,
        #[source]
        source: Box<RegistryError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::InvalidPath(_)
            | RegistryError::InvalidParameter(_)
            | RegistryError::NotFound(_) => ErrorKind::User,
            RegistryError::Unauthorized(_) => ErrorKind::Auth,
            RegistryError::Concurrency(_) => ErrorKind::Concurrency,
            RegistryError::Storage(_)
            | RegistryError::Config(_)
            | RegistryError::Session(_)
            | RegistryError::Cache(_)
            | RegistryError::Resolution { .. }
            | RegistryError::Io(_)
            | RegistryError::Serialization(_) => ErrorKind::Server,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Server | ErrorKind::Concurrency)
    }

    /// Wraps a failure of a lazy context lookup so it surfaces as a server error.
    pub(crate) fn resolution(path: impl Into<String>, source: RegistryError) -> Self {
        RegistryError::Resolution {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

impl From<confique::Error> for RegistryError {
    fn from(err: confique::Error) -> Self {
        RegistryError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
