//! `ncclfetch list` – print the active catalog.

use anyhow::Result;
use ncclfetch_core::config::NcclFetchConfig;
use ncclfetch_core::request::Architecture;

pub fn run_list(cfg: &NcclFetchConfig, as_toml: bool) -> Result<()> {
    let catalog = cfg.catalog()?;
    if as_toml {
        print!("{}", catalog.to_toml()?);
        return Ok(());
    }

    println!("{:<8} {:<8} {:<8} {}", "TOOLKIT", "NCCL", "PINNED", "FILENAME");
    for d in catalog.iter() {
        let pinned: Vec<&str> = Architecture::ALL
            .iter()
            .filter(|a| d.digest_for(**a).is_some())
            .map(|a| a.as_str())
            .collect();
        let pinned = if pinned.is_empty() {
            "-".to_string()
        } else {
            pinned.join(",")
        };
        println!(
            "{:<8} {:<8} {:<8} {}",
            d.toolkit_version, d.full_version, pinned, d.filename_template
        );
    }
    Ok(())
}
