use crate::loader::LoaderInstance;
use crate::mods::{scan_mods, Mod, ICON_FILE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const PROFILE_FILE: &str = "profile.json";
pub const MODS_DIR: &str = "mods";
const RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoaderStatus {
    NotInstalled,
    Installing,
    Ready,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub game_id: String,
    pub name: String,
    pub root: PathBuf,
    pub loader: Option<LoaderInstance>,
    pub mods: Vec<Mod>,
    pub status: LoaderStatus,
}

/// What actually goes into `profile.json`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRecord {
    #[serde(rename = "__version")]
    version: u32,
    id: String,
    game_id: String,
    name: String,
    #[serde(default)]
    loader: Option<LoaderInstance>,
}

impl Profile {
    pub fn new(game_id: &str, name: &str, root: PathBuf, loader: Option<LoaderInstance>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            game_id: game_id.to_string(),
            name: name.to_string(),
            root,
            loader,
            mods: Vec::new(),
            status: LoaderStatus::NotInstalled,
        }
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.root.join(MODS_DIR)
    }

    pub fn mod_dir(&self, mod_id: &str) -> PathBuf {
        self.mods_dir().join(crate::paths::sanitize_component(mod_id))
    }

    pub fn icon_path(&self, mod_id: &str) -> Option<PathBuf> {
        let path = self.mod_dir(mod_id).join(ICON_FILE);
        path.is_file().then_some(path)
    }

    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(self.mods_dir()).with_context(|| format!("create {}", self.mods_dir().display()))?;
        let record = ProfileRecord {
            version: RECORD_VERSION,
            id: self.id.clone(),
            game_id: self.game_id.clone(),
            name: self.name.clone(),
            loader: self.loader.clone(),
        };
        let path = self.root.join(PROFILE_FILE);
        fs::write(&path, serde_json::to_string_pretty(&record)?).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Reads `<dir>/profile.json`. Mods are not scanned here; see [`Profile::load_mods`].
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(PROFILE_FILE);
        let text = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let record: ProfileRecord = serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
        if record.version != RECORD_VERSION {
            anyhow::bail!("unsupported profile record version {}", record.version);
        }
        if record.id.is_empty() || record.game_id.is_empty() || record.name.is_empty() {
            anyhow::bail!("profile record has empty required fields");
        }
        Ok(Self {
            id: record.id,
            game_id: record.game_id,
            name: record.name,
            root: dir.to_path_buf(),
            loader: record.loader,
            mods: Vec::new(),
            status: LoaderStatus::NotInstalled,
        })
    }

    pub fn load_mods(&mut self) -> Result<()> {
        self.mods = scan_mods(&self.mods_dir())?;
        Ok(())
    }
}

/// Loads every profile below `root`. Directories without a `profile.json`, with an
/// invalid record or with an id already seen are skipped.
pub fn load_profiles(root: &Path) -> Result<Vec<Profile>> {
    fs::create_dir_all(root).with_context(|| format!("create {}", root.display()))?;
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)
        .with_context(|| format!("read {}", root.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    let mut seen = HashSet::new();
    let mut profiles = Vec::new();
    for dir in dirs {
        if !dir.join(PROFILE_FILE).is_file() {
            continue;
        }
        let mut profile = match Profile::load(&dir) {
            Ok(p) => p,
            Err(e) => {
                warn!("Skipping profile at {}: {:#}", dir.display(), e);
                continue;
            }
        };
        if !seen.insert(profile.id.clone()) {
            warn!("Skipping profile at {}: id {} already in use", dir.display(), profile.id);
            continue;
        }
        if let Err(e) = profile.load_mods() {
            warn!("Failed to scan mods of profile '{}': {:#}", profile.name, e);
        }
        info!("Loaded profile '{}' with {} mods", profile.name, profile.mods.len());
        profiles.push(profile);
    }
    Ok(profiles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> Option<LoaderInstance> {
        Some(LoaderInstance { id: "3dmigoto".into(), version: "v7.0".into() })
    }

    #[test]
    fn save_then_load_round_trips_identity_and_loader() {
        let tmp = tempfile::tempdir().unwrap();
        let profile = Profile::new("genshin_impact", "Main", tmp.path().join("Main"), instance());
        profile.save().unwrap();
        assert!(profile.mods_dir().is_dir());

        let loaded = load_profiles(tmp.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, profile.id);
        assert_eq!(loaded[0].game_id, "genshin_impact");
        assert_eq!(loaded[0].name, "Main");
        assert_eq!(loaded[0].loader, instance());
    }

    #[test]
    fn record_carries_version_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let profile = Profile::new("g", "A", tmp.path().join("A"), instance());
        profile.save().unwrap();
        let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(tmp.path().join("A").join(PROFILE_FILE)).unwrap()).unwrap();
        assert_eq!(v["__version"], 1);
        assert_eq!(v["gameId"], "g");
        assert_eq!(v["loader"]["version"], "v7.0");
    }

    #[test]
    fn load_skips_missing_invalid_and_duplicate_profiles() {
        let tmp = tempfile::tempdir().unwrap();
        let a = Profile::new("g", "A", tmp.path().join("A"), None);
        a.save().unwrap();
        let mut b = a.clone();
        b.root = tmp.path().join("B");
        b.name = "B".into();
        b.save().unwrap();

        fs::create_dir_all(tmp.path().join("empty")).unwrap();
        fs::create_dir_all(tmp.path().join("broken")).unwrap();
        fs::write(tmp.path().join("broken").join(PROFILE_FILE), r#"{"__version":1,"id":"x"}"#).unwrap();
        fs::create_dir_all(tmp.path().join("future")).unwrap();
        fs::write(
            tmp.path().join("future").join(PROFILE_FILE),
            r#"{"__version":2,"id":"y","gameId":"g","name":"future"}"#,
        )
        .unwrap();

        let loaded = load_profiles(tmp.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "A");
    }

    #[test]
    fn icon_path_only_when_present() {
        let tmp = tempfile::tempdir().unwrap();
        let profile = Profile::new("g", "A", tmp.path().join("A"), None);
        profile.save().unwrap();
        assert!(profile.icon_path("123").is_none());
        fs::create_dir_all(profile.mod_dir("123")).unwrap();
        fs::write(profile.mod_dir("123").join(ICON_FILE), b"png").unwrap();
        assert!(profile.icon_path("123").is_some());
    }
}
