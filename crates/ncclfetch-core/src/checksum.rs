//! Content digests for downloaded artifacts.
//!
//! Files are hashed in fixed-size chunks so memory stays bounded no matter
//! how large the shared library is.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

const BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha256,
}

impl HashAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha256 => "sha256",
        }
    }

    /// Length of the lowercase hex encoding.
    fn hex_len(self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha256 => 64,
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha256" => Ok(HashAlgorithm::Sha256),
            other => anyhow::bail!("unknown hash algorithm {:?} (expected md5 or sha256)", other),
        }
    }
}

/// An expected digest, written as `<algorithm>:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex.
    pub hex: String,
}

impl Digest {
    pub fn new(algorithm: HashAlgorithm, hex: &str) -> Result<Self> {
        let hex = hex.trim().to_ascii_lowercase();
        if hex.len() != algorithm.hex_len() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            anyhow::bail!(
                "{} digest must be {} hex characters, got {:?}",
                algorithm.name(),
                algorithm.hex_len(),
                hex
            );
        }
        Ok(Digest { algorithm, hex })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.name(), self.hex)
    }
}

impl FromStr for Digest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (algo, hex) = s
            .split_once(':')
            .with_context(|| format!("digest {:?} must look like md5:<hex> or sha256:<hex>", s))?;
        Digest::new(algo.parse()?, hex)
    }
}

impl TryFrom<String> for Digest {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> String {
        d.to_string()
    }
}

/// Hash a file with `algorithm` and return the digest as lowercase hex.
/// Reads in chunks to keep memory use bounded; suitable for large files.
pub fn hash_path(path: &Path, algorithm: HashAlgorithm) -> io::Result<String> {
    let f = File::open(path)?;
    match algorithm {
        HashAlgorithm::Md5 => hash_reader::<md5::Md5>(f),
        HashAlgorithm::Sha256 => hash_reader::<sha2::Sha256>(f),
    }
}

fn hash_reader<D: sha2::Digest>(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Outcome of comparing a file against an expected digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Match,
    /// Carries the digest actually observed.
    Mismatch(Digest),
}

/// Compare the file at `path` against `expected`.
pub fn verify(path: &Path, expected: &Digest) -> io::Result<Verdict> {
    let actual = hash_path(path, expected.algorithm)?;
    if actual == expected.hex {
        Ok(Verdict::Match)
    } else {
        Ok(Verdict::Mismatch(Digest {
            algorithm: expected.algorithm,
            hex: actual,
        }))
    }
}
