//! Disk side of a download.
//!
//! Bytes stream into a `.part` file next to the target; only a complete
//! transfer is synced, given its final mode and atomically renamed into place.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Mode for installed artifacts: shared libraries readable and executable by everyone.
pub const ARTIFACT_MODE: u32 = 0o755;

/// `path` with `suffix` appended to its file name.
pub fn with_suffix(path: &Path, suffix: impl AsRef<OsStr>) -> PathBuf {
    let mut o = path.as_os_str().to_owned();
    o.push(suffix);
    PathBuf::from(o)
}

/// Path for the temp file (e.g. `libnccl.so.2.18.1` → `libnccl.so.2.18.1.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    with_suffix(final_path, TEMP_SUFFIX)
}

/// Sequential writer for an in-progress download.
pub struct PartFile {
    file: BufWriter<File>,
    temp_path: PathBuf,
    written: u64,
}

impl PartFile {
    /// Create (or truncate) the temp file.
    pub fn create(temp_path: &Path) -> io::Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)?;
        Ok(PartFile {
            file: BufWriter::new(file),
            temp_path: temp_path.to_path_buf(),
            written: 0,
        })
    }

    pub fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)?;
        self.written += data.len() as u64;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Drop the partial file.
    pub fn discard(self) {
        let temp_path = self.temp_path.clone();
        drop(self.file);
        if let Err(e) = fs::remove_file(&temp_path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("failed to remove {}: {}", temp_path.display(), e);
            }
        }
    }

    /// Flush, fsync, apply `mode` and rename onto `final_path`. Returns bytes written.
    pub fn finalize(self, final_path: &Path, mode: u32) -> io::Result<u64> {
        let written = self.written;
        let temp_path = self.temp_path.clone();
        let result = self
            .file
            .into_inner()
            .map_err(|e| e.into_error())
            .and_then(|file| file.sync_all())
            .and_then(|()| set_mode(&temp_path, mode))
            .and_then(|()| fs::rename(&temp_path, final_path));
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result.map(|()| written)
    }
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
