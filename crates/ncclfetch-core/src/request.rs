//! Fetch requests: which NCCL line, for which toolkit, on which CPU.

use crate::error::AcquireError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CPU architectures upstream publishes builds for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X86_64,
    Aarch64,
    Ppc64le,
}

impl Architecture {
    pub const ALL: [Architecture; 3] = [
        Architecture::X86_64,
        Architecture::Aarch64,
        Architecture::Ppc64le,
    ];

    /// Token used in upstream filenames.
    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::X86_64 => "x86_64",
            Architecture::Aarch64 => "aarch64",
            Architecture::Ppc64le => "ppc64le",
        }
    }

    /// Architecture of the running process, if supported.
    pub fn host() -> Result<Self, AcquireError> {
        match std::env::consts::ARCH {
            "powerpc64" if cfg!(target_endian = "little") => Ok(Architecture::Ppc64le),
            other => other.parse(),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = AcquireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" => Ok(Architecture::X86_64),
            "aarch64" | "arm64" => Ok(Architecture::Aarch64),
            "ppc64le" => Ok(Architecture::Ppc64le),
            _ => Err(AcquireError::InvalidArchitecture(s.to_string())),
        }
    }
}

/// A validated request for one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// e.g. "2.18"
    pub artifact_major: String,
    /// e.g. "12"
    pub toolkit_major: String,
    pub architecture: Architecture,
}

impl FetchRequest {
    /// Build a request from loose parts. Fails before any I/O on bad versions
    /// or an unsupported architecture.
    pub fn new(
        artifact_major: &str,
        toolkit_major: &str,
        architecture: &str,
    ) -> Result<Self, AcquireError> {
        let architecture = architecture.parse()?;
        Self::with_architecture(artifact_major, toolkit_major, architecture)
    }

    pub fn with_architecture(
        artifact_major: &str,
        toolkit_major: &str,
        architecture: Architecture,
    ) -> Result<Self, AcquireError> {
        check_version("artifact version", artifact_major)?;
        check_major("toolkit version", toolkit_major)?;
        Ok(FetchRequest {
            artifact_major: artifact_major.to_string(),
            toolkit_major: toolkit_major.to_string(),
            architecture,
        })
    }

    /// Parse a version spec of the form `<artifactMajor>+<tag><toolkitMajor>`,
    /// e.g. `2.18+cu12` with `toolkit_tag = "cu"`.
    pub fn parse(
        spec: &str,
        toolkit_tag: &str,
        architecture: Architecture,
    ) -> Result<Self, AcquireError> {
        let spec = spec.trim();
        let (artifact, toolkit) = spec.split_once('+').ok_or_else(|| {
            AcquireError::InvalidInput(format!(
                "{spec:?}: expected <version>+{toolkit_tag}<major>, e.g. 2.18+{toolkit_tag}12"
            ))
        })?;
        let toolkit_major = toolkit.strip_prefix(toolkit_tag).ok_or_else(|| {
            AcquireError::InvalidInput(format!(
                "{spec:?}: toolkit part {toolkit:?} must start with {toolkit_tag:?}"
            ))
        })?;
        Self::with_architecture(artifact, toolkit_major, architecture)
    }

    /// Directory name for this request's toolkit, e.g. `cu12`.
    pub fn toolkit_dir(&self, toolkit_tag: &str) -> String {
        format!("{}{}", toolkit_tag, self.toolkit_major)
    }
}

fn check_version(what: &str, v: &str) -> Result<(), AcquireError> {
    let valid = !v.is_empty()
        && v
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));
    if valid {
        Ok(())
    } else {
        Err(AcquireError::InvalidInput(format!(
            "{what} {v:?} is not a dotted number"
        )))
    }
}

/// Toolkit versions are requested by major only ("12", not "12.0").
fn check_major(what: &str, v: &str) -> Result<(), AcquireError> {
    if !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AcquireError::InvalidInput(format!(
            "{what} {v:?} must be a single major number, e.g. 12"
        )))
    }
}
