//! Checksum command: compute the digest of a file.

use anyhow::{Context, Result};
use ncclfetch_core::checksum::{self, HashAlgorithm};
use std::path::Path;

/// Compute and print the digest of the given file.
pub fn run_checksum(path: &Path, algo: &str) -> Result<()> {
    let algorithm: HashAlgorithm = algo.parse()?;
    let digest = checksum::hash_path(path, algorithm)
        .with_context(|| format!("hash {}", path.display()))?;
    println!("{}:{}  {}", algorithm.name(), digest, path.display());
    Ok(())
}
