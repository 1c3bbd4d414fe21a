use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Verified install folder per game id.
    pub game_install_paths: BTreeMap<String, PathBuf>,
    /// Sent as a bearer token to the release feed to lift anonymous rate limits.
    pub github_token: Option<String>,
    pub version_cache_ttl_secs: u64,
    /// Log filter directives used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            game_install_paths: BTreeMap::new(),
            github_token: None,
            version_cache_ttl_secs: 120,
            log_filter: "info".to_string(),
        }
    }
}

impl AppSettings {
    pub fn version_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.version_cache_ttl_secs)
    }
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).with_context(|| format!("create {}", data_dir.display()))?;
        Ok(Self { path: data_dir.join("settings.toml") })
    }

    pub fn default_data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "plugboo", "plugboo")
            .ok_or_else(|| anyhow::anyhow!("failed to resolve project directories"))?;
        Ok(dirs.data_dir().to_path_buf())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<AppSettings> {
        if !self.path.exists() {
            return Ok(AppSettings::default());
        }
        let text = fs::read_to_string(&self.path).with_context(|| format!("read {}", self.path.display()))?;
        let settings: AppSettings = toml::from_str(&text).with_context(|| format!("parse {}", self.path.display()))?;
        Ok(settings)
    }

    pub fn save(&self, settings: &AppSettings) -> Result<()> {
        let text = toml::to_string_pretty(settings)?;
        fs::write(&self.path, text).with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(tmp.path()).unwrap();
        let settings = store.load().unwrap();
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.version_cache_ttl(), Duration::from_secs(120));
    }

    #[test]
    fn save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(tmp.path()).unwrap();
        let mut settings = AppSettings::default();
        settings.game_install_paths.insert("genshin_impact".into(), PathBuf::from("/games/genshin"));
        settings.github_token = Some("token".into());
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), settings);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(tmp.path()).unwrap();
        fs::write(store.path(), "github_token = \"abc\"\n").unwrap();
        let settings = store.load().unwrap();
        assert_eq!(settings.github_token.as_deref(), Some("abc"));
        assert_eq!(settings.version_cache_ttl_secs, 120);
        assert_eq!(settings.log_filter, "info");
    }

    #[test]
    fn log_filter_is_read_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(tmp.path()).unwrap();
        fs::write(store.path(), "log_filter = \"debug,reqwest=warn\"\n").unwrap();
        assert_eq!(store.load().unwrap().log_filter, "debug,reqwest=warn");
    }
}
