//! Print the effective configuration.

use anyhow::{Context, Result};
use chat_client::ClientConfig;

/// Render `config` as TOML.
pub fn run(config: &ClientConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to render configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_config_parses_back() {
        let mut config = ClientConfig::default();
        config.store.utc_offset_minutes = 120;

        let rendered = run(&config).unwrap();

        assert!(rendered.contains("page_size = 100"));
        assert_eq!(ClientConfig::from_toml_str(&rendered).unwrap(), config);
    }
}
