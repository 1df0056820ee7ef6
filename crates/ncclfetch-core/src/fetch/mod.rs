//! Network retrieval of a resolved URL into a local file.
//!
//! Fetchers never retry; the cache manager owns the retry policy.

mod error;
mod http;

pub use http::CurlFetcher;
pub use error::{classify_curl_error, classify_http_status, FailureKind, FetchError};

use std::path::Path;
use std::time::Duration;

/// Downloads one URL to one path.
pub trait Fetcher {
    /// Stream `url` into `dest`, creating parent directories as needed.
    ///
    /// `dest` only ever appears complete; a failed transfer leaves nothing
    /// under that name. Returns the number of bytes written.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError>;
}

impl<F: Fetcher + ?Sized> Fetcher for &F {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        (**self).fetch(url, dest)
    }
}

/// Transfer limits applied to every request.
#[derive(Debug, Clone, Copy)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    /// Upper bound for the whole transfer.
    pub timeout: Duration,
    /// Abort if throughput stays below `low_speed_limit` bytes/s for `low_speed_time`.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
    pub max_redirections: u32,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            timeout: Duration::from_secs(3600),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            max_redirections: 10,
        }
    }
}
