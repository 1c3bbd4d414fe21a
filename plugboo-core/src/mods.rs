use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

pub const MOD_INFO_FILE: &str = "modinfo.json";
pub const ICON_FILE: &str = "icon.png";
pub const DATA_DIR: &str = "data";

/// Installed content package, as recorded in `mods/<id>/modinfo.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mod {
    pub id: String,
    pub name: String,
    pub author: String,
    pub version: String,
    pub enabled: bool,
}

fn string_field(obj: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

impl Mod {
    /// Validates a metadata record. `id` may be a string or a number; `name` is
    /// required; `author`/`version` fall back to empty and `enabled` to true.
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = match obj.get("id")? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let name = string_field(obj, "name")?;
        Some(Self {
            id,
            name,
            author: string_field(obj, "author").unwrap_or_default(),
            version: string_field(obj, "version").unwrap_or_default(),
            enabled: obj.get("enabled").and_then(Value::as_bool).unwrap_or(true),
        })
    }

    pub fn read_info(mod_dir: &Path) -> Option<Self> {
        let path = mod_dir.join(MOD_INFO_FILE);
        let text = fs::read_to_string(&path).ok()?;
        let value: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                warn!("Unreadable mod info {}: {}", path.display(), e);
                return None;
            }
        };
        Self::from_json(&value)
    }

    /// Written through a temp file so a crash never leaves a truncated record.
    pub fn write_info(&self, mod_dir: &Path) -> Result<()> {
        let path = mod_dir.join(MOD_INFO_FILE);
        let tmp = mod_dir.join(format!("{MOD_INFO_FILE}.tmp"));
        let text = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, text).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("move {} into place", tmp.display()))?;
        Ok(())
    }
}

/// Loads every valid mod under `mods_dir`, creating the directory if needed. Entries
/// without a readable `modinfo.json` and repeated ids are skipped.
pub fn scan_mods(mods_dir: &Path) -> Result<Vec<Mod>> {
    fs::create_dir_all(mods_dir).with_context(|| format!("create {}", mods_dir.display()))?;
    let mut seen = HashSet::new();
    let mut mods = Vec::new();
    for entry in fs::read_dir(mods_dir).with_context(|| format!("read {}", mods_dir.display()))? {
        let Ok(entry) = entry else { continue };
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let Some(m) = Mod::read_info(&dir) else {
            debug!("Skipping {}: no valid {}", dir.display(), MOD_INFO_FILE);
            continue;
        };
        if !seen.insert(m.id.clone()) {
            warn!("Duplicate mod id '{}' in {}", m.id, dir.display());
            continue;
        }
        mods.push(m);
    }
    mods.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(mods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_ids_and_missing_optionals_are_accepted() {
        let m = Mod::from_json(&json!({ "id": 123, "name": "Outfit" })).unwrap();
        assert_eq!(m.id, "123");
        assert!(m.enabled);
        assert_eq!(m.author, "");
        assert!(Mod::from_json(&json!({ "id": 1 })).is_none());
        assert!(Mod::from_json(&json!({ "id": [1], "name": "x" })).is_none());
    }

    #[test]
    fn scan_skips_broken_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let mods_dir = tmp.path().join("mods");

        let good = mods_dir.join("123");
        fs::create_dir_all(&good).unwrap();
        Mod { id: "123".into(), name: "Outfit".into(), author: "a".into(), version: "1".into(), enabled: true }
            .write_info(&good)
            .unwrap();

        let no_info = mods_dir.join("456");
        fs::create_dir_all(no_info.join(DATA_DIR)).unwrap();
        let bad_json = mods_dir.join("789");
        fs::create_dir_all(&bad_json).unwrap();
        fs::write(bad_json.join(MOD_INFO_FILE), "{ not json").unwrap();
        let dup = mods_dir.join("copy-of-123");
        fs::create_dir_all(&dup).unwrap();
        fs::copy(good.join(MOD_INFO_FILE), dup.join(MOD_INFO_FILE)).unwrap();

        let mods = scan_mods(&mods_dir).unwrap();
        assert_eq!(mods.len(), 1);
        assert_eq!(mods[0].name, "Outfit");
        assert!(!good.join("modinfo.json.tmp").exists());
    }

    #[test]
    fn scan_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let mods_dir = tmp.path().join("p").join("mods");
        assert!(scan_mods(&mods_dir).unwrap().is_empty());
        assert!(mods_dir.is_dir());
    }
}
