//! Advisory lock serializing downloads of one canonical destination.

use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Held for the whole check → download → verify → install sequence.
/// Released when dropped.
#[derive(Debug)]
pub struct DownloadLock {
    file: File,
    path: PathBuf,
}

impl DownloadLock {
    /// Lock file for `dest`: `<dir>/.<name>.lock`.
    pub fn path_for(dest: &Path) -> PathBuf {
        let mut name = OsString::from(".");
        name.push(dest.file_name().unwrap_or_else(|| dest.as_os_str()));
        name.push(".lock");
        dest.with_file_name(name)
    }

    /// Block until the lock for `dest` is ours. The parent directory must exist.
    pub fn acquire(dest: &Path) -> io::Result<Self> {
        let path = Self::path_for(dest);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        if file.try_lock_exclusive().is_err() {
            tracing::info!("waiting for another process to finish {}", dest.display());
            file.lock_exclusive()?;
        }
        Ok(DownloadLock { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DownloadLock {
    fn drop(&mut self) {
        // Keep the lock file: waiters may already hold its inode.
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_path_is_hidden_sibling() {
        let p = DownloadLock::path_for(Path::new("/c/nccl/cu12/libnccl.so.2.18.1"));
        assert_eq!(p, PathBuf::from("/c/nccl/cu12/.libnccl.so.2.18.1.lock"));
    }

    #[test]
    fn second_holder_is_excluded_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("libnccl.so");

        let first = DownloadLock::acquire(&dest).unwrap();
        assert!(first.path().exists());

        let probe = File::open(first.path()).unwrap();
        assert!(probe.try_lock_exclusive().is_err());

        drop(first);
        assert!(probe.try_lock_exclusive().is_ok());
    }
}
