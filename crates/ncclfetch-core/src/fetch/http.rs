//! Single-stream HTTP GET via libcurl.

use super::{CurlOptions, FetchError, Fetcher};
use crate::storage::{self, PartFile, ARTIFACT_MODE};
use curl::easy::Easy;
use std::fs;
use std::io;
use std::path::Path;

/// Fetcher backed by a fresh curl `Easy` handle per download.
#[derive(Debug, Clone, Default)]
pub struct CurlFetcher {
    opts: CurlOptions,
}

impl CurlFetcher {
    pub fn new(opts: CurlOptions) -> Self {
        Self { opts }
    }

    /// GET `url`, streaming the body into `part`.
    fn transfer(&self, url: &str, part: &mut PartFile) -> Result<(), FetchError> {
        let mut easy = Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.max_redirections(self.opts.max_redirections)?;
        easy.connect_timeout(self.opts.connect_timeout)?;
        easy.low_speed_limit(self.opts.low_speed_limit)?;
        easy.low_speed_time(self.opts.low_speed_time)?;
        easy.timeout(self.opts.timeout)?;

        let mut write_err: Option<io::Error> = None;
        let performed = {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| match part.append(data) {
                Ok(()) => Ok(data.len()),
                Err(e) => {
                    write_err = Some(e);
                    Ok(0) // abort transfer
                }
            })?;
            transfer.perform()
        };
        if let Some(e) = write_err {
            return Err(FetchError::Storage(e));
        }
        performed?;

        let code = easy.response_code()?;
        if !(200..300).contains(&code) {
            return Err(FetchError::Http(code));
        }
        Ok(())
    }
}

impl Fetcher for CurlFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(FetchError::Storage)?;
        }
        let mut part = PartFile::create(&storage::temp_path(dest)).map_err(FetchError::Storage)?;

        tracing::info!("downloading {} -> {}", url, part.temp_path().display());
        if let Err(e) = self.transfer(url, &mut part) {
            tracing::warn!("download of {} failed after {} bytes: {}", url, part.written(), e);
            part.discard();
            return Err(e);
        }

        let written = part.finalize(dest, ARTIFACT_MODE).map_err(FetchError::Storage)?;
        tracing::info!("downloaded {} bytes to {}", written, dest.display());
        Ok(written)
    }
}
