//! Crate-wide error types.
//!
//! Library modules return [`Error`] through the [`Result`] alias, while the
//! CLI and `main` use `anyhow` for convenient propagation.
//!
//! # Design
//!
//! - [`Error`]: top-level error enum, `Clone` so one failure can be handed to
//!   every caller waiting on the same in-flight operation
//! - [`CatalogError`]: failures of the streaming catalog client
//! - [`Error::Silent`]: expected conditions that skip the interactive
//!   recovery prompt (e.g. "not authorized yet")
//! - [`Error::Unsupported`]: an optional backend operation that is not
//!   implemented, which is an integration error rather than a transient fault
//!
//! # Example
//!
//! ```ignore
//! use medley::error::{Error, Result, ResultExt};
//!
//! async fn load(fs: &dyn FileSystem, path: &str) -> Result<Vec<u8>> {
//!     fs.read_file(path).await.with_context(format!("reading {path}"))
//! }
//! ```

use std::sync::Arc;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    /// Metadata parsing error
    #[error("Metadata error for {path}: {message}")]
    Metadata { path: String, message: String },

    /// Audio playback error
    #[error("Playback error: {0}")]
    Playback(String),

    /// Requested item does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration or persisted state error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Streaming catalog error
    #[error("Catalog error: {0}")]
    Catalog(CatalogError),

    /// Expected condition that bypasses interactive recovery
    #[error("{0}")]
    Silent(String),

    /// Optional operation not implemented by the backend
    #[error("{service} does not support {operation}")]
    Unsupported {
        service: String,
        operation: &'static str,
    },

    /// A refresh returned a song with a different id
    #[error("Refreshing song {expected} unexpectedly changed its id to {actual}")]
    IdentityChanged { expected: String, actual: String },

    /// Playback was interrupted by a newer request
    #[error("Operation aborted")]
    Aborted,

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a metadata error.
    pub fn metadata(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a playback error.
    pub fn playback(message: impl Into<String>) -> Self {
        Self::Playback(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a silent error.
    pub fn silent(message: impl Into<String>) -> Self {
        Self::Silent(message.into())
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(service: impl Into<String>, operation: &'static str) -> Self {
        Self::Unsupported {
            service: service.into(),
            operation,
        }
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping context layers.
    pub fn root(&self) -> &Error {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error must bypass interactive recovery.
    pub fn is_silent(&self) -> bool {
        matches!(self.root(), Self::Silent(_))
    }

    /// Whether this error reports a missing optional capability.
    pub fn is_unsupported(&self) -> bool {
        matches!(self.root(), Self::Unsupported { .. })
    }

    /// Whether this error reports an interrupted playback request.
    pub fn is_aborted(&self) -> bool {
        matches!(self.root(), Self::Aborted)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl From<CatalogError> for Error {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Unauthorized(message) => Self::Silent(message),
            other => Self::Catalog(other),
        }
    }
}

/// Errors raised by the streaming catalog client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - try again later")]
    RateLimited,

    #[error("API request failed: {0}")]
    Api(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::from(e).context(ctx))
    }
}
