//! Initialize the configuration directory: create ~/.bridge and a default config file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Create the config directory and write a default `config.json` if missing.
/// An existing config file is left untouched. Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let mut default_config = serde_json::to_string_pretty(&Config::default())
            .context("serializing default config")?;
        default_config.push('\n');
        std::fs::write(config_path, default_config)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("bridge-init-test-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn writes_loadable_default_config() {
        let dir = temp_dir();
        let path = dir.join("config.json");
        let out = init_config_dir(&path).unwrap();
        assert_eq!(out, dir);

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: Config = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.gateway.port, Config::default().gateway.port);
        assert!(raw.contains("\"webhookPath\""));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn existing_config_is_kept() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, b"{\"gateway\":{\"port\":9}}").unwrap();
        init_config_dir(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\"gateway\":{\"port\":9}}"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }
}
