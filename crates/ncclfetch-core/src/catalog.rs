//! Known NCCL redistributables, as a data table.
//!
//! The built-in table starts with the md5-pinned vllm-nccl release builds,
//! followed by the upstream redist index. A TOML file with the same shape can
//! replace it; either way the declared order is the priority order used by
//! the resolver.

use crate::checksum::{Digest, HashAlgorithm};
use crate::request::Architecture;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Architecture token every filename template is written with.
pub const REFERENCE_ARCH: Architecture = Architecture::X86_64;

pub const DEFAULT_URL_TEMPLATE: &str =
    "https://developer.download.nvidia.com/compute/redist/nccl/v{public_version}/{filename}";

pub const MIRROR_URL_TEMPLATE: &str =
    "https://github.com/vllm-project/vllm-nccl/releases/download/v0.1.0/{filename}";

/// Installed name of the mirror builds.
pub const MIRROR_INSTALL_NAME: &str = "libnccl.so.2.18.1";

// (toolkit, full version, filename, x86_64 md5)
const MIRROR: &[(&str, &str, &str, &str)] = &[
    ("11.0", "2.18.1", "cu11-libnccl.so.2.18.1", "5129e4e7e671cc7ce072aaeea870bee8"),
    ("12.0", "2.18.1", "cu12-libnccl.so.2.18.1", "296c4de7fbdb0f7fd8501fb63bd0cb40"),
];

// (toolkit, full version, public version, filename template)
const UPSTREAM: &[(&str, &str, &str, &str)] = &[
    ("11.8", "2.16.5", "2.16.5", "nccl_2.16.5-1+cuda11.8_x86_64.txz"),
    ("12.0", "2.16.5", "2.16.5", "nccl_2.16.5-1+cuda12.0_x86_64.txz"),
    ("11.0", "2.17.1", "2.17.1", "nccl_2.17.1-1+cuda11.0_x86_64.txz"),
    ("12.0", "2.17.1", "2.17.1", "nccl_2.17.1-1+cuda12.0_x86_64.txz"),
    ("11.0", "2.18.1", "2.18.1", "nccl_2.18.1-1+cuda11.0_x86_64.txz"),
    ("12.0", "2.18.1", "2.18.1", "nccl_2.18.1-1+cuda12.0_x86_64.txz"),
    ("11.0", "2.20.3", "2.20.3", "nccl_2.20.3-1+cuda11.0_x86_64.txz"),
    ("12.2", "2.20.3", "2.20.3", "nccl_2.20.3-1+cuda12.2_x86_64.txz"),
];

fn default_url_template() -> String {
    DEFAULT_URL_TEMPLATE.to_string()
}

/// One downloadable build: an NCCL version compiled against one toolkit version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionDescriptor {
    /// e.g. "12.0"
    pub toolkit_version: String,
    /// e.g. "2.18.1"
    pub full_version: String,
    /// Version used in the download URL path.
    pub public_version: String,
    /// Upstream filename, written for the reference architecture (`x86_64`).
    pub filename_template: String,
    /// Placeholders: `{public_version}`, `{full_version}`, `{filename}`.
    #[serde(default = "default_url_template")]
    pub url_template: String,
    /// Name of the installed file; defaults to the resolved filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_name: Option<String>,
    /// Pinned digests keyed by architecture token.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub digests: BTreeMap<String, Digest>,
}

impl DistributionDescriptor {
    /// Leading component of `toolkit_version` ("12.0" → "12").
    pub fn toolkit_major(&self) -> &str {
        self.toolkit_version
            .split('.')
            .next()
            .unwrap_or(&self.toolkit_version)
    }

    /// True if this build belongs to the requested toolkit and NCCL lines.
    ///
    /// Versions compare by dotted component, so "2.1" does not match "2.18.1".
    pub fn matches(&self, toolkit_major: &str, artifact_major: &str) -> bool {
        self.toolkit_major() == toolkit_major && version_has_prefix(&self.full_version, artifact_major)
    }

    /// Templates without the reference token name a single-architecture build.
    pub fn supports(&self, arch: Architecture) -> bool {
        arch == REFERENCE_ARCH || self.filename_template.contains(REFERENCE_ARCH.as_str())
    }

    pub fn filename(&self, arch: Architecture) -> String {
        self.filename_template
            .replace(REFERENCE_ARCH.as_str(), arch.as_str())
    }

    pub fn url(&self, arch: Architecture) -> String {
        self.url_template
            .replace("{public_version}", &self.public_version)
            .replace("{full_version}", &self.full_version)
            .replace("{filename}", &self.filename(arch))
    }

    pub fn install_name(&self, arch: Architecture) -> String {
        self.install_name
            .clone()
            .unwrap_or_else(|| self.filename(arch))
    }

    pub fn digest_for(&self, arch: Architecture) -> Option<&Digest> {
        self.digests.get(arch.as_str())
    }
}

fn version_has_prefix(full: &str, prefix: &str) -> bool {
    let mut full = full.split('.');
    prefix.split('.').all(|want| full.next() == Some(want))
}

/// Ordered list of descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(rename = "descriptor", default)]
    pub descriptors: Vec<DistributionDescriptor>,
}

impl Catalog {
    /// Pinned mirror builds first, then the unpinned upstream redist table.
    ///
    /// Mirror filenames carry no architecture token, so they only serve
    /// x86_64; other architectures fall through to the redist entries.
    pub fn builtin() -> Self {
        let mirror = MIRROR.iter().map(|(toolkit, full, filename, md5)| {
            let pin = Digest {
                algorithm: HashAlgorithm::Md5,
                hex: md5.to_string(),
            };
            DistributionDescriptor {
                toolkit_version: toolkit.to_string(),
                full_version: full.to_string(),
                public_version: full.to_string(),
                filename_template: filename.to_string(),
                url_template: MIRROR_URL_TEMPLATE.to_string(),
                install_name: Some(MIRROR_INSTALL_NAME.to_string()),
                digests: BTreeMap::from([(REFERENCE_ARCH.as_str().to_string(), pin)]),
            }
        });
        let upstream = UPSTREAM
            .iter()
            .map(|(toolkit, full, public, filename)| DistributionDescriptor {
                toolkit_version: toolkit.to_string(),
                full_version: full.to_string(),
                public_version: public.to_string(),
                filename_template: filename.to_string(),
                url_template: default_url_template(),
                install_name: None,
                digests: BTreeMap::new(),
            });
        Catalog {
            descriptors: mirror.chain(upstream).collect(),
        }
    }

    /// Load a catalog file (`[[descriptor]]` tables).
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("read catalog {}", path.display()))?;
        Self::from_toml_str(&data).with_context(|| format!("parse catalog {}", path.display()))
    }

    pub fn from_toml_str(data: &str) -> Result<Self> {
        let catalog: Catalog = toml::from_str(data)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DistributionDescriptor> {
        self.descriptors.iter()
    }

    fn validate(&self) -> Result<()> {
        if self.descriptors.is_empty() {
            anyhow::bail!("catalog has no descriptors");
        }
        for (i, d) in self.descriptors.iter().enumerate() {
            for key in d.digests.keys() {
                key.parse::<Architecture>()
                    .with_context(|| format!("descriptor {} ({}): digest key", i, d.full_version))?;
            }
            if d.toolkit_version.is_empty() || d.full_version.is_empty() {
                anyhow::bail!("descriptor {}: toolkit_version and full_version are required", i);
            }
            if !d.url_template.contains("{filename}") {
                tracing::debug!(
                    index = i,
                    "url_template has no {{filename}} placeholder; using it verbatim"
                );
            }
        }
        Ok(())
    }
}
