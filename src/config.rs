use std::{fs, path::Path};

use anyhow::{Context, Result};
use referral_core::{RateConfig, RateTable};

/// Read a TOML rate configuration. Missing fields take their defaults.
pub fn load_config(path: &Path) -> Result<RateConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    parse_config(&text).with_context(|| format!("parse config {}", path.display()))
}

pub fn parse_config(text: &str) -> Result<RateConfig> {
    Ok(toml::from_str(text)?)
}

/// Load and validate in one step.
pub fn load_rate_table(path: &Path) -> Result<RateTable> {
    let config = load_config(path)?;
    RateTable::new(config).with_context(|| format!("invalid rates in {}", path.display()))
}

pub fn render_default() -> Result<String> {
    Ok(toml::to_string_pretty(&RateConfig::default())?)
}
