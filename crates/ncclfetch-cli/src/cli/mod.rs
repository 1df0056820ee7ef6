//! CLI for ncclfetch.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ncclfetch_core::config;
use std::path::{Path, PathBuf};

use commands::{run_checksum, run_ensure, run_list, run_resolve};

/// Top-level CLI for ncclfetch.
#[derive(Debug, Parser)]
#[command(name = "ncclfetch")]
#[command(about = "ncclfetch: fetch, verify and cache prebuilt NCCL libraries", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/ncclfetch/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download (if needed) and verify an artifact, then print its path.
    Ensure {
        /// Version spec, e.g. 2.18+cu12.
        #[arg(env = "NCCLFETCH_VERSION")]
        spec: String,

        /// Target architecture (x86_64, aarch64, ppc64le); defaults to the host.
        #[arg(long)]
        arch: Option<String>,

        /// Expected digest, overriding the catalog pin (md5:<hex> or sha256:<hex>).
        #[arg(long, value_name = "ALGO:HEX")]
        digest: Option<String>,
    },

    /// Show the URL, install path and expected digest for a spec without downloading.
    Resolve {
        /// Version spec, e.g. 2.18+cu12.
        #[arg(env = "NCCLFETCH_VERSION")]
        spec: String,

        /// Target architecture; defaults to the host.
        #[arg(long)]
        arch: Option<String>,
    },

    /// List the active catalog.
    List {
        /// Print as a catalog file (usable as `catalog_path`).
        #[arg(long)]
        toml: bool,
    },

    /// Compute the digest of a file.
    Checksum {
        /// Path to the file.
        path: String,

        /// Hash algorithm: md5 or sha256.
        #[arg(long, default_value = "sha256")]
        algo: String,
    },
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        let cfg = match &cli.config {
            Some(path) => config::load_from(path)?,
            None => config::load_or_init()?,
        };
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Ensure { spec, arch, digest } => {
                run_ensure(&cfg, &spec, arch.as_deref(), digest.as_deref())?
            }
            CliCommand::Resolve { spec, arch } => run_resolve(&cfg, &spec, arch.as_deref())?,
            CliCommand::List { toml } => run_list(&cfg, toml)?,
            CliCommand::Checksum { path, algo } => run_checksum(Path::new(&path), &algo)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
