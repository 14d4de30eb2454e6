//! Effective configuration dump.

use anyhow::Result;
use kaas_config::SystemConfig;

/// Print `config` after file lookup and environment overrides.
pub fn show(config: &SystemConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
