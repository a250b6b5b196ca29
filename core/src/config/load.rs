use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::AppConfig;

/// Get the default forge data directory: ~/.forge
pub fn get_forge_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".forge"))
}

/// Load configuration from an explicit path, applying environment overrides.
pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let mut cfg = toml::from_str::<AppConfig>(&s)
        .with_context(|| format!("parse config {}", path.display()))?;
    apply_env_overrides(&mut cfg);
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.forge/config.toml (highest)
    let user_config = get_forge_data_dir().ok().map(|d| d.join("config.toml"));

    // Priority 2: ./forge.toml (current directory)
    let local_config = Path::new("forge.toml");

    match user_config.filter(|p| p.exists()) {
        Some(path) => load_from_path(&path),
        None if local_config.exists() => load_from_path(local_config),
        None => {
            let mut cfg = AppConfig::default();
            apply_env_overrides(&mut cfg);
            Ok(cfg)
        }
    }
}

/// Environment variable overrides (highest priority).
fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Ok(v) = std::env::var("FORGE_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.logging.level = v;
        }
    }

    if let Ok(v) = std::env::var("FORGE_TASK_TIMEOUT_MS") {
        match v.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => cfg.executor.task_timeout_ms = ms,
            _ => tracing::warn!(value = %v, "ignoring invalid FORGE_TASK_TIMEOUT_MS"),
        }
    }
}
