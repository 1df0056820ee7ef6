//! `ncclfetch ensure` – make sure a verified artifact is cached and print its path.

use super::{build_manager, parse_request};
use anyhow::Result;
use ncclfetch_core::checksum::Digest;
use ncclfetch_core::config::NcclFetchConfig;
use ncclfetch_core::AcquireError;
use std::fs;

pub fn run_ensure(
    cfg: &NcclFetchConfig,
    spec: &str,
    arch: Option<&str>,
    digest: Option<&str>,
) -> Result<()> {
    let request = parse_request(cfg, spec, arch)?;
    let digest = digest
        .map(|d| d.parse::<Digest>())
        .transpose()
        .map_err(|e| AcquireError::InvalidInput(format!("--digest: {:#}", e)))?;

    let manager = build_manager(cfg)?;
    let installed = manager.ensure_with_digest(&request, digest)?;
    tracing::info!(
        path = %installed.path.display(),
        downloaded = installed.downloaded,
        attempts = installed.attempts,
        "ensure {} done",
        spec
    );

    let path = fs::canonicalize(&installed.path).unwrap_or(installed.path);
    println!("{}", path.display());
    Ok(())
}
