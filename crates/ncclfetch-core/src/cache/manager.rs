//! Resolve → fetch → verify against a canonical destination.
//!
//! The canonical path only ever receives a file that passed verification:
//! downloads land in a staging file next to it and are renamed into place
//! after the digest matches. A pre-existing canonical file that fails
//! verification is deleted and downloaded again.

use super::{CacheLayout, DownloadLock};
use crate::catalog::Catalog;
use crate::checksum::{self, Digest, Verdict};
use crate::error::AcquireError;
use crate::fetch::Fetcher;
use crate::request::FetchRequest;
use crate::resolver::{self, ResolvedSource};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::storage;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Suffix of the downloaded-but-not-yet-verified file.
pub const STAGING_SUFFIX: &str = ".unverified";

/// What `ensure` would do for a request, computed without any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub source: ResolvedSource,
    pub destination: PathBuf,
    /// Caller override if given, else the catalog pin for the architecture.
    pub expected_digest: Option<Digest>,
}

/// A verified artifact at its canonical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installed {
    pub path: PathBuf,
    /// False when an already cached file passed verification.
    pub downloaded: bool,
    /// Download attempts made by this call.
    pub attempts: u32,
    pub digest: Digest,
}

pub struct CacheManager<F> {
    catalog: Catalog,
    layout: CacheLayout,
    fetcher: F,
    retry: RetryPolicy,
    lock_downloads: bool,
}

impl<F: Fetcher> CacheManager<F> {
    pub fn new(catalog: Catalog, layout: CacheLayout, fetcher: F) -> Self {
        Self {
            catalog,
            layout,
            fetcher,
            retry: RetryPolicy::default(),
            lock_downloads: true,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_locking(mut self, lock_downloads: bool) -> Self {
        self.lock_downloads = lock_downloads;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn plan(
        &self,
        request: &FetchRequest,
        digest_override: Option<Digest>,
    ) -> Result<Plan, AcquireError> {
        let source = resolver::resolve(&self.catalog, request)?;
        let destination = self.layout.destination(request, &source);
        let expected_digest = digest_override.or_else(|| source.expected_digest.clone());
        Ok(Plan {
            source,
            destination,
            expected_digest,
        })
    }

    /// Return the path of a verified copy of the requested artifact,
    /// downloading it if the cache does not already hold one.
    pub fn ensure(&self, request: &FetchRequest) -> Result<Installed, AcquireError> {
        self.ensure_with_digest(request, None)
    }

    pub fn ensure_with_digest(
        &self,
        request: &FetchRequest,
        digest_override: Option<Digest>,
    ) -> Result<Installed, AcquireError> {
        let plan = self.plan(request, digest_override)?;
        let expected = plan
            .expected_digest
            .clone()
            .ok_or_else(|| AcquireError::Unverifiable {
                filename: plan.source.filename.clone(),
                architecture: plan.source.architecture.to_string(),
            })?;
        let dest = plan.destination.as_path();
        let hit = Installed {
            path: dest.to_path_buf(),
            downloaded: false,
            attempts: 0,
            digest: expected.clone(),
        };

        // A verified hit needs neither a writable cache nor the lock.
        if dest.exists() && verify(dest, &expected)? == Verdict::Match {
            tracing::debug!("cache hit: {} matches {}", dest.display(), expected);
            return Ok(hit);
        }

        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| AcquireError::io("create directory", dir, e))?;
        let _lock = if self.lock_downloads {
            Some(DownloadLock::acquire(dest).map_err(|e| AcquireError::io("lock", dest, e))?)
        } else {
            None
        };

        // Another process may have installed the file while we waited.
        if self.check_existing(dest, &expected)? {
            return Ok(hit);
        }

        let attempts = self.download_verified(&plan.source.url, dest, &expected)?;
        Ok(Installed {
            path: dest.to_path_buf(),
            downloaded: true,
            attempts,
            digest: expected,
        })
    }

    /// True if `dest` already holds a verified artifact. A file that fails
    /// verification is removed.
    fn check_existing(&self, dest: &Path, expected: &Digest) -> Result<bool, AcquireError> {
        if !dest.exists() {
            return Ok(false);
        }
        match verify(dest, expected)? {
            Verdict::Match => {
                tracing::debug!("cache hit: {} matches {}", dest.display(), expected);
                Ok(true)
            }
            Verdict::Mismatch(actual) => {
                tracing::warn!(
                    path = %dest.display(),
                    %expected,
                    %actual,
                    "cached file failed verification, removing"
                );
                remove(dest)?;
                Ok(false)
            }
        }
    }

    /// Download into the staging path until the digest matches or the retry
    /// policy gives up. Returns the number of attempts.
    fn download_verified(
        &self,
        url: &str,
        dest: &Path,
        expected: &Digest,
    ) -> Result<u32, AcquireError> {
        let staging = storage::with_suffix(dest, STAGING_SUFFIX);
        let mut attempt = 1u32;
        loop {
            self.fetcher
                .fetch(url, &staging)
                .map_err(|source| AcquireError::Network {
                    url: url.to_string(),
                    source,
                })?;

            let actual = match verify(&staging, expected) {
                Ok(Verdict::Match) => {
                    fs::rename(&staging, dest)
                        .map_err(|e| AcquireError::io("install", dest, e))?;
                    tracing::info!(
                        "installed {} ({}, attempt {})",
                        dest.display(),
                        expected,
                        attempt
                    );
                    return Ok(attempt);
                }
                Ok(Verdict::Mismatch(actual)) => actual,
                Err(e) => {
                    let _ = fs::remove_file(&staging);
                    return Err(e);
                }
            };

            tracing::warn!(
                %url,
                attempt,
                %expected,
                %actual,
                "downloaded file failed verification, discarding"
            );
            remove(&staging)?;

            match self.retry.decide(attempt) {
                RetryDecision::NoRetry => {
                    return Err(AcquireError::VerificationExhausted {
                        path: dest.to_path_buf(),
                        attempts: attempt,
                        expected: expected.to_string(),
                        actual: actual.to_string(),
                    });
                }
                RetryDecision::RetryAfter(delay) => {
                    if !delay.is_zero() {
                        tracing::info!("retrying {} in {:?}", url, delay);
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

fn verify(path: &Path, expected: &Digest) -> Result<Verdict, AcquireError> {
    checksum::verify(path, expected).map_err(|e| AcquireError::io("hash", path, e))
}

fn remove(path: &Path) -> Result<(), AcquireError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AcquireError::io("remove", path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::HashAlgorithm;
    use crate::fetch::FetchError;
    use crate::request::Architecture;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const GOOD: &[u8] = b"libnccl good build\n";
    const BAD: &[u8] = b"truncated garbage";

    fn md5_of(body: &[u8]) -> Digest {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("b");
        fs::write(&p, body).unwrap();
        Digest::new(HashAlgorithm::Md5, &checksum::hash_path(&p, HashAlgorithm::Md5).unwrap())
            .unwrap()
    }

    /// Serves scripted responses in order, repeating the last one.
    struct ScriptedFetcher {
        script: RefCell<VecDeque<Result<&'static [u8], u32>>>,
        calls: Cell<u32>,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<Result<&'static [u8], u32>>) -> Self {
            Self {
                script: RefCell::new(script.into()),
                calls: Cell::new(0),
            }
        }
    }

    impl Fetcher for ScriptedFetcher {
        fn fetch(&self, _url: &str, dest: &Path) -> Result<u64, FetchError> {
            self.calls.set(self.calls.get() + 1);
            let next = {
                let mut script = self.script.borrow_mut();
                if script.len() > 1 {
                    script.pop_front().unwrap()
                } else {
                    *script.front().unwrap()
                }
            };
            match next {
                Ok(body) => {
                    fs::create_dir_all(dest.parent().unwrap()).unwrap();
                    fs::write(dest, body).map_err(FetchError::Storage)?;
                    Ok(body.len() as u64)
                }
                Err(code) => Err(FetchError::Http(code)),
            }
        }
    }

    fn manager(root: &Path, fetcher: ScriptedFetcher) -> CacheManager<ScriptedFetcher> {
        CacheManager::new(
            Catalog::builtin(),
            CacheLayout::new(root, "nccl", "cu"),
            fetcher,
        )
        .with_retry(RetryPolicy::immediate(3))
    }

    fn request() -> FetchRequest {
        FetchRequest::new("2.18", "12", "x86_64").unwrap()
    }

    fn staging_of(path: &Path) -> PathBuf {
        storage::with_suffix(path, STAGING_SUFFIX)
    }

    #[test]
    fn second_ensure_does_no_network_io() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path(), ScriptedFetcher::new(vec![Ok(GOOD)]));

        let first = m.ensure_with_digest(&request(), Some(md5_of(GOOD))).unwrap();
        assert!(first.downloaded);
        assert_eq!(first.attempts, 1);
        assert_eq!(m.fetcher().calls.get(), 1);

        let second = m.ensure_with_digest(&request(), Some(md5_of(GOOD))).unwrap();
        assert!(!second.downloaded);
        assert_eq!(second.path, first.path);
        assert_eq!(m.fetcher().calls.get(), 1);
        assert_eq!(fs::read(&second.path).unwrap(), GOOD);
    }

    #[test]
    fn mismatch_then_match_retries_once_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path(), ScriptedFetcher::new(vec![Ok(BAD), Ok(GOOD)]));

        let installed = m.ensure_with_digest(&request(), Some(md5_of(GOOD))).unwrap();
        assert_eq!(installed.attempts, 2);
        assert_eq!(m.fetcher().calls.get(), 2);
        assert_eq!(fs::read(&installed.path).unwrap(), GOOD);
        assert!(!staging_of(&installed.path).exists());
    }

    #[test]
    fn corrupt_cached_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path(), ScriptedFetcher::new(vec![Ok(GOOD)]));
        let plan = m.plan(&request(), Some(md5_of(GOOD))).unwrap();
        fs::create_dir_all(plan.destination.parent().unwrap()).unwrap();
        fs::write(&plan.destination, BAD).unwrap();

        let installed = m.ensure_with_digest(&request(), Some(md5_of(GOOD))).unwrap();
        assert!(installed.downloaded);
        assert_eq!(m.fetcher().calls.get(), 1);
        assert_eq!(fs::read(&plan.destination).unwrap(), GOOD);
    }

    #[test]
    fn persistent_mismatch_is_bounded_and_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path(), ScriptedFetcher::new(vec![Ok(BAD)]));

        let err = m.ensure_with_digest(&request(), Some(md5_of(GOOD))).unwrap_err();
        match err {
            AcquireError::VerificationExhausted {
                ref path,
                attempts,
                ref actual,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(actual, &md5_of(BAD).to_string());
                assert!(!path.exists());
                assert!(!staging_of(path).exists());
            }
            other => panic!("expected VerificationExhausted, got {other:?}"),
        }
        assert_eq!(m.fetcher().calls.get(), 3);
    }

    #[test]
    fn network_error_is_fatal_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path(), ScriptedFetcher::new(vec![Err(503), Ok(GOOD)]));

        let err = m.ensure_with_digest(&request(), Some(md5_of(GOOD))).unwrap_err();
        assert!(matches!(
            err,
            AcquireError::Network {
                source: FetchError::Http(503),
                ..
            }
        ));
        assert_eq!(m.fetcher().calls.get(), 1);
        let plan = m.plan(&request(), None).unwrap();
        assert!(!plan.destination.exists());
    }

    #[test]
    fn request_and_resolution_errors_precede_network_io() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path(), ScriptedFetcher::new(vec![Ok(GOOD)]));

        assert!(matches!(
            FetchRequest::new("2.18", "12", "mips"),
            Err(AcquireError::InvalidArchitecture(_))
        ));

        let missing = FetchRequest::new("2.99", "12", "x86_64").unwrap();
        assert!(matches!(
            m.ensure_with_digest(&missing, Some(md5_of(GOOD))),
            Err(AcquireError::NotFound { .. })
        ));

        // Redist entries carry no pin, so without an override nothing can be verified.
        let unpinned = FetchRequest::new("2.18", "12", "aarch64").unwrap();
        assert!(matches!(
            m.ensure(&unpinned),
            Err(AcquireError::Unverifiable { .. })
        ));
        assert_eq!(m.fetcher().calls.get(), 0);
    }

    #[test]
    fn catalog_pin_is_used_when_no_override() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::from_toml_str(&format!(
            r#"
            [[descriptor]]
            toolkit_version = "12.0"
            full_version = "2.18.1"
            public_version = "2.18.1"
            filename_template = "cu12-libnccl.so.2.18.1"
            url_template = "https://mirror.example/{{filename}}"
            install_name = "libnccl.so.2.18.1"

            [descriptor.digests]
            x86_64 = "{}"
            "#,
            md5_of(GOOD)
        ))
        .unwrap();
        let m = CacheManager::new(
            catalog,
            CacheLayout::new(dir.path(), "nccl", "cu"),
            ScriptedFetcher::new(vec![Ok(GOOD)]),
        )
        .with_locking(false);

        let installed = m.ensure(&request()).unwrap();
        assert_eq!(installed.path, dir.path().join("nccl/cu12/libnccl.so.2.18.1"));
        assert_eq!(installed.digest, md5_of(GOOD));
    }

    #[test]
    fn builtin_catalog_pins_the_mirror_build() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path(), ScriptedFetcher::new(vec![Ok(BAD)]));
        let request = FetchRequest::parse("2.18+cu12", "cu", Architecture::X86_64).unwrap();

        let plan = m.plan(&request, None).unwrap();
        assert_eq!(plan.destination, dir.path().join("nccl/cu12/libnccl.so.2.18.1"));
        assert_eq!(
            plan.expected_digest.as_ref().unwrap().to_string(),
            "md5:296c4de7fbdb0f7fd8501fb63bd0cb40"
        );

        // No override: the catalog pin is what the download is checked against.
        match m.ensure(&request).unwrap_err() {
            AcquireError::VerificationExhausted { expected, .. } => {
                assert_eq!(expected, "md5:296c4de7fbdb0f7fd8501fb63bd0cb40");
            }
            other => panic!("expected VerificationExhausted, got {other:?}"),
        }
        assert_eq!(m.fetcher().calls.get(), 3);
    }

    #[test]
    fn verified_hit_needs_no_lock_or_write_access() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path(), ScriptedFetcher::new(vec![Ok(GOOD)]));
        let installed = m.ensure_with_digest(&request(), Some(md5_of(GOOD))).unwrap();
        let cu_dir = installed.path.parent().unwrap().to_path_buf();
        let lock = DownloadLock::path_for(&installed.path);
        fs::remove_file(&lock).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&cu_dir, fs::Permissions::from_mode(0o555)).unwrap();
        }
        let again = m.ensure_with_digest(&request(), Some(md5_of(GOOD)));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&cu_dir, fs::Permissions::from_mode(0o755)).unwrap();
        }

        let again = again.unwrap();
        assert!(!again.downloaded);
        assert!(!lock.exists());
        assert_eq!(m.fetcher().calls.get(), 1);
    }

    /// Thread-safe fetcher that holds each transfer open for a while.
    struct SlowFetcher {
        calls: AtomicU32,
    }

    impl Fetcher for SlowFetcher {
        fn fetch(&self, _url: &str, dest: &Path) -> Result<u64, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            fs::write(dest, GOOD).map_err(FetchError::Storage)?;
            Ok(GOOD.len() as u64)
        }
    }

    #[test]
    fn concurrent_ensure_downloads_once() {
        let dir = tempfile::tempdir().unwrap();
        let m = CacheManager::new(
            Catalog::builtin(),
            CacheLayout::new(dir.path(), "nccl", "cu"),
            SlowFetcher {
                calls: AtomicU32::new(0),
            },
        )
        .with_retry(RetryPolicy::immediate(3));
        let digest = md5_of(GOOD);

        let results: Vec<Installed> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| s.spawn(|| m.ensure_with_digest(&request(), Some(digest.clone()))))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect()
        });

        assert_eq!(m.fetcher().calls.load(Ordering::SeqCst), 1);
        assert_eq!(results.iter().filter(|r| r.downloaded).count(), 1);
        assert_eq!(results[0].path, results[1].path);
        assert_eq!(fs::read(&results[0].path).unwrap(), GOOD);
    }
}
