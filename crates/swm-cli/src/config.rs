use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use swm_core::EngineConfig;

pub const CONFIG_FILE: &str = "swm.toml";
pub const DB_FILE: &str = "swm.db";

pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".swm")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// `$SWM_DATA_DIR`, else `~/.swm`.
pub fn data_dir() -> PathBuf {
    env::var("SWM_DATA_DIR")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(default_base_dir)
}

/// Load the engine configuration: an explicit path must exist; otherwise
/// `swm.toml` in the data dir is used when present, else defaults.
pub fn load(explicit: Option<&Path>, data_dir: &Path) -> Result<EngineConfig> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => Some(data_dir.join(CONFIG_FILE)).filter(|p| p.is_file()),
    };

    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let config = parse(&text).with_context(|| format!("invalid config {}", path.display()))?;
            tracing::info!("loaded config from {}", path.display());
            config
        }
        None => EngineConfig::default(),
    };
    Ok(config)
}

pub fn parse(text: &str) -> Result<EngineConfig> {
    let config: EngineConfig = toml::from_str(text).context("failed to parse TOML")?;
    config.validate()?;
    Ok(config)
}
