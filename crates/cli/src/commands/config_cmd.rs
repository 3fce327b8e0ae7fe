//! `miniluma config`: write or show the configuration.

use anyhow::{Context, Result};
use miniluma_config::AppConfig;
use std::path::Path;

const REDACTED: &str = "[REDACTED]";

pub fn run(path: &Path, init: bool, show: bool) -> Result<()> {
    if !init && !show {
        println!("{}", path.display());
        return Ok(());
    }

    if init {
        if write_default(path)? {
            println!("Created {}", path.display());
        } else {
            println!("Config already exists at {}", path.display());
        }
    }

    if show {
        let config = AppConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?;
        println!("{}", render_redacted(&config)?);
    }

    Ok(())
}

/// Write `AppConfig::default_toml()` unless a file is already there.
/// Returns whether a file was written.
pub fn write_default(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

/// The config as TOML with every secret replaced.
pub fn render_redacted(config: &AppConfig) -> Result<String> {
    let mut config = config.clone();
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(REDACTED.into());
        }
    }
    if config.tools.search_api_key.is_some() {
        config.tools.search_api_key = Some(REDACTED.into());
    }
    toml::to_string_pretty(&config).context("Failed to render config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert!(write_default(&path).unwrap());
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# MiniLuma configuration"));
        assert!(AppConfig::from_toml_str(&written).is_ok());

        std::fs::write(&path, "default_provider = \"mock\"\n").unwrap();
        assert!(!write_default(&path).unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "default_provider = \"mock\"\n"
        );
    }

    #[test]
    fn show_hides_secrets() {
        let mut config = AppConfig::default();
        if let Some(openai) = config.providers.get_mut("openai") {
            openai.api_key = Some("sk-very-secret".into());
        }
        config.tools.search_api_key = Some("search-secret".into());

        let rendered = render_redacted(&config).unwrap();
        assert!(!rendered.contains("sk-very-secret"));
        assert!(!rendered.contains("search-secret"));
        assert!(rendered.contains(REDACTED));
        assert!(rendered.contains("[gateway]"));
    }
}
