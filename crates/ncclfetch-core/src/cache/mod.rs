//! Canonical on-disk locations and the acquire/verify state machine.

mod lock;
mod manager;

pub use lock::DownloadLock;
pub use manager::{CacheManager, Installed, Plan};

use crate::request::FetchRequest;
use crate::resolver::ResolvedSource;
use std::path::{Path, PathBuf};

/// Maps a resolved request to its canonical destination:
/// `<root>/<family>/<tag><toolkitMajor>/<install_name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    pub root: PathBuf,
    pub family: String,
    pub toolkit_tag: String,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>, family: &str, toolkit_tag: &str) -> Self {
        Self {
            root: root.into(),
            family: family.to_string(),
            toolkit_tag: toolkit_tag.to_string(),
        }
    }

    pub fn toolkit_dir(&self, request: &FetchRequest) -> PathBuf {
        self.root
            .join(&self.family)
            .join(request.toolkit_dir(&self.toolkit_tag))
    }

    pub fn destination(&self, request: &FetchRequest, source: &ResolvedSource) -> PathBuf {
        self.toolkit_dir(request).join(&source.install_name)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
