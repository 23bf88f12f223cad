//! Configuration loading for convsync-sim.

use anyhow::{Context, Result};
use chat_client::ClientConfig;
use std::path::Path;

/// Load `path`, or the built-in defaults when no file is given.
pub fn load(path: Option<&Path>) -> Result<ClientConfig> {
    let Some(path) = path else {
        return Ok(ClientConfig::default());
    };
    let config = ClientConfig::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_without_file() {
        assert_eq!(load(None).unwrap(), ClientConfig::default());
    }

    #[test]
    fn reads_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("convsync.toml");
        std::fs::write(&path, "[store]\npage_size = 25\n").unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.store.page_size, 25);
        assert_eq!(config.scheduler.retry_backoff_ms, 2000);
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let err = load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("absent.toml"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("convsync.toml");
        std::fs::write(&path, "[store]\npage_size = 0\n").unwrap();

        assert!(load(Some(&path)).is_err());
    }
}
