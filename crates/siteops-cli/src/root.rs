use anyhow::Context;
use siteops_core::config::{Config, CONFIG_FILE};
use siteops_core::store::RedbStore;
use std::path::{Path, PathBuf};

/// Resolve the config file path.
///
/// Priority:
/// 1. `--config` flag / `SITEOPS_CONFIG` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `siteops.yaml`
/// 3. Fall back to `cwd/siteops.yaml`
pub fn resolve_config(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let mut dir = cwd.clone();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return candidate;
        }
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => break,
        }
    }

    cwd.join(CONFIG_FILE)
}

/// Load the config, falling back to defaults when the file does not exist.
pub fn load_config(config_path: &Path) -> anyhow::Result<Config> {
    Config::load_or_default(config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))
}

/// Open the entity store named by the config.
pub fn open_store(config_path: &Path) -> anyhow::Result<RedbStore> {
    let config = load_config(config_path)?;
    let db_path = config.database_path(config_path);
    let db = siteops_core::db::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    Ok(RedbStore::new(db))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_config_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.yaml");
        assert_eq!(resolve_config(Some(&path)), path);
    }

    #[test]
    fn missing_config_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.triggers.len(), 4);
    }

    #[test]
    fn store_opens_next_to_config() {
        let dir = TempDir::new().unwrap();
        open_store(&dir.path().join(CONFIG_FILE)).unwrap();
        assert!(dir.path().join("siteops.redb").exists());
    }
}
