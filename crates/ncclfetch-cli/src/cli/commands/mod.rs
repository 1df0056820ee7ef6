//! CLI command handlers, one per file.

mod checksum;
mod ensure;
mod list;
mod resolve;

pub use checksum::run_checksum;
pub use ensure::run_ensure;
pub use list::run_list;
pub use resolve::run_resolve;

use anyhow::Result;
use ncclfetch_core::cache::CacheManager;
use ncclfetch_core::config::NcclFetchConfig;
use ncclfetch_core::fetch::CurlFetcher;
use ncclfetch_core::request::{Architecture, FetchRequest};
use ncclfetch_core::AcquireError;

/// Build a request from a version spec, using the host architecture unless `arch` is given.
pub(crate) fn parse_request(
    cfg: &NcclFetchConfig,
    spec: &str,
    arch: Option<&str>,
) -> Result<FetchRequest, AcquireError> {
    let architecture = match arch {
        Some(a) => a.parse()?,
        None => Architecture::host()?,
    };
    FetchRequest::parse(spec, &cfg.toolkit_tag, architecture)
}

pub(crate) fn build_manager(cfg: &NcclFetchConfig) -> Result<CacheManager<CurlFetcher>> {
    Ok(CacheManager::new(
        cfg.catalog()?,
        cfg.layout()?,
        CurlFetcher::new(cfg.curl_options()),
    )
    .with_retry(cfg.retry_policy()?)
    .with_locking(cfg.lock_downloads))
}
