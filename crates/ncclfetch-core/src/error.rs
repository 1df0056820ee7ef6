//! Error taxonomy for the resolve → fetch → verify pipeline.
//!
//! Each variant belongs to exactly one phase so the CLI can say which step
//! failed and pick a stable exit code.

use crate::fetch::FetchError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquireError {
    /// Malformed request (bad version spec, missing separator, bad digest).
    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error("unsupported architecture {0:?} (supported: x86_64, aarch64, ppc64le)")]
    InvalidArchitecture(String),

    /// No catalog descriptor matches the requested major versions.
    #[error("no catalog entry for nccl {artifact} built against toolkit {toolkit}")]
    NotFound { toolkit: String, artifact: String },

    /// The resolved artifact has no expected digest, so it could never pass verification.
    #[error("no expected digest for {filename} on {architecture}; pin one in the catalog or pass --digest")]
    Unverifiable {
        filename: String,
        architecture: String,
    },

    #[error("download of {url} failed")]
    Network {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error(
        "{}: digest mismatch after {attempts} attempt(s) (expected {expected}, got {actual})",
        .path.display()
    )]
    VerificationExhausted {
        path: PathBuf,
        attempts: u32,
        expected: String,
        actual: String,
    },

    /// Local filesystem failure outside the transfer itself.
    #[error("failed to {action} {}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AcquireError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AcquireError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Pipeline phase the error was raised in.
    pub fn phase(&self) -> &'static str {
        match self {
            AcquireError::InvalidInput(_) | AcquireError::InvalidArchitecture(_) => "request",
            AcquireError::NotFound { .. } | AcquireError::Unverifiable { .. } => "resolve",
            AcquireError::Network { .. } => "fetch",
            AcquireError::VerificationExhausted { .. } => "verify",
            AcquireError::Io { .. } => "install",
        }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            AcquireError::InvalidInput(_)
            | AcquireError::InvalidArchitecture(_)
            | AcquireError::Unverifiable { .. } => 2,
            AcquireError::NotFound { .. } => 3,
            AcquireError::Network { .. } => 4,
            AcquireError::VerificationExhausted { .. } => 5,
            AcquireError::Io { .. } => 1,
        }
    }
}
