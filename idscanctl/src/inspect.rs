use std::path::PathBuf;

use anyhow::{Context, Result};
use idscan_config::{ConfigLoad, ConfigLoader};

fn load(path: Option<PathBuf>) -> Result<ConfigLoad> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = path {
        loader = loader.with_path(path);
    }
    loader.load().context("failed to load configuration")
}

pub fn show(path: Option<PathBuf>) -> Result<()> {
    let loaded = load(path)?;
    println!("# source: {}", loaded.source);
    if let Some(env_file) = &loaded.env_file_loaded {
        println!("# env file: {}", env_file.display());
    }
    if !loaded.overrides.is_empty() {
        println!("# overrides: {}", loaded.overrides.join(", "));
    }
    print!("{}", loaded.to_toml()?);
    Ok(())
}

/// Returns `false` when warnings were found and `deny_warnings` is set.
pub fn check(path: Option<PathBuf>, deny_warnings: bool) -> Result<bool> {
    let loaded = load(path)?;
    println!("configuration OK ({})", loaded.source);
    if loaded.warnings.is_empty() {
        return Ok(true);
    }
    println!("{} warning(s):", loaded.warnings.len());
    for warning in loaded.warnings.iter() {
        println!("  - {warning}");
    }
    Ok(!deny_warnings)
}
