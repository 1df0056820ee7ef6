//! Turns a fetch request into a concrete download source.
//!
//! Pure lookup over the catalog; never touches the network or the disk.

use crate::catalog::{Catalog, DistributionDescriptor};
use crate::checksum::Digest;
use crate::error::AcquireError;
use crate::request::{Architecture, FetchRequest};

/// Everything needed to download and verify one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub url: String,
    /// Upstream filename with the architecture substituted.
    pub filename: String,
    /// File name at the canonical destination.
    pub install_name: String,
    pub expected_digest: Option<Digest>,
    pub architecture: Architecture,
    pub descriptor: DistributionDescriptor,
}

/// Pick the first descriptor matching `request` and build its source.
///
/// Declared catalog order is the priority order: the earliest matching entry wins.
pub fn resolve(catalog: &Catalog, request: &FetchRequest) -> Result<ResolvedSource, AcquireError> {
    let arch = request.architecture;
    let descriptor = catalog
        .iter()
        .find(|d| d.matches(&request.toolkit_major, &request.artifact_major) && d.supports(arch))
        .ok_or_else(|| AcquireError::NotFound {
            toolkit: request.toolkit_major.clone(),
            artifact: format!("{} ({})", request.artifact_major, arch),
        })?;

    let url = descriptor.url(arch);
    url::Url::parse(&url).map_err(|e| {
        AcquireError::InvalidInput(format!(
            "catalog entry {} for toolkit {} produced invalid URL {:?}: {}",
            descriptor.full_version, descriptor.toolkit_version, url, e
        ))
    })?;

    tracing::debug!(
        toolkit = %descriptor.toolkit_version,
        version = %descriptor.full_version,
        %arch,
        %url,
        "resolved source"
    );

    Ok(ResolvedSource {
        url,
        filename: descriptor.filename(arch),
        install_name: descriptor.install_name(arch),
        expected_digest: descriptor.digest_for(arch).cloned(),
        architecture: arch,
        descriptor: descriptor.clone(),
    })
}
