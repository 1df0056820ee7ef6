//! `ncclfetch resolve` – show what `ensure` would fetch, without any I/O.

use super::{build_manager, parse_request};
use anyhow::Result;
use ncclfetch_core::config::NcclFetchConfig;

pub fn run_resolve(cfg: &NcclFetchConfig, spec: &str, arch: Option<&str>) -> Result<()> {
    let request = parse_request(cfg, spec, arch)?;
    let plan = build_manager(cfg)?.plan(&request, None)?;
    let d = &plan.source.descriptor;

    println!("nccl:        {} (public {})", d.full_version, d.public_version);
    println!("toolkit:     {}", d.toolkit_version);
    println!("arch:        {}", plan.source.architecture);
    println!("url:         {}", plan.source.url);
    println!("destination: {}", plan.destination.display());
    match &plan.expected_digest {
        Some(digest) => println!("digest:      {}", digest),
        None => println!("digest:      (none pinned; ensure needs --digest)"),
    }
    Ok(())
}
