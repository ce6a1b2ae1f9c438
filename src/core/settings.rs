use crate::models::settings::Settings;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Load `keyfleet.toml`; a missing file yields the defaults.
pub fn load(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("read settings {}", path.display()))?;
    let settings: Settings =
        toml::from_str(&content).with_context(|| format!("parse settings {}", path.display()))?;
    let factor = settings.retry.backoff_factor;
    if !factor.is_finite() || factor < 0.0 {
        anyhow::bail!("retry.backoff_factor must be a finite, non-negative number (got {})", factor);
    }
    Ok(settings)
}
