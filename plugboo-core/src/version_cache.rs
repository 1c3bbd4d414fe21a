use crate::loader::LoaderVersion;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(120);

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Time-boxed snapshot of resolved loader versions, one JSON file per loader:
/// `{ "timestamp": <unix ms>, "versions": [...] }`.
#[derive(Debug, Clone)]
pub struct VersionCache {
    ttl: Duration,
}

impl Default for VersionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl VersionCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn read(&self, path: &Path) -> Option<Vec<LoaderVersion>> {
        self.read_at(path, now_millis())
    }

    /// Any problem with the file is a miss. Entries of a fresh file that do not
    /// match the version shape are dropped individually.
    pub fn read_at(&self, path: &Path, now_ms: i64) -> Option<Vec<LoaderVersion>> {
        let text = fs::read_to_string(path).ok()?;
        let root: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                debug!("Version cache {} is not valid JSON: {}", path.display(), e);
                return None;
            }
        };
        let timestamp = root.get("timestamp").and_then(Value::as_f64)?;
        let entries = root.get("versions").and_then(Value::as_array)?;

        let age_ms = now_ms as f64 - timestamp;
        if age_ms >= self.ttl.as_millis() as f64 {
            debug!("Version cache {} is stale ({} ms old)", path.display(), age_ms);
            return None;
        }

        let versions: Vec<LoaderVersion> = entries
            .iter()
            .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
            .collect();
        if versions.len() != entries.len() {
            debug!("Dropped {} malformed entries from {}", entries.len() - versions.len(), path.display());
        }
        Some(versions)
    }

    pub fn write(&self, path: &Path, versions: &[LoaderVersion]) -> Result<()> {
        self.write_at(path, versions, now_millis())
    }

    pub fn write_at(&self, path: &Path, versions: &[LoaderVersion], now_ms: i64) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let body = json!({ "timestamp": now_ms, "versions": versions });
        fs::write(path, serde_json::to_string_pretty(&body)?).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoaderFile;

    fn version(tag: &str) -> LoaderVersion {
        LoaderVersion {
            version: tag.into(),
            dev_file: LoaderFile { name: format!("{tag}-dev.zip"), url: format!("https://x/{tag}-dev.zip") },
            play_file: LoaderFile { name: format!("{tag}-play.zip"), url: format!("https://x/{tag}-play.zip") },
        }
    }

    #[test]
    fn fresh_cache_is_a_hit() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("3dmigoto.json");
        let cache = VersionCache::default();
        cache.write_at(&path, &[version("v1"), version("v2")], 1_000_000).unwrap();

        let hit = cache.read_at(&path, 1_000_000 + 119_999).unwrap();
        assert_eq!(hit, vec![version("v1"), version("v2")]);
    }

    #[test]
    fn stale_cache_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("c.json");
        let cache = VersionCache::default();
        cache.write_at(&path, &[version("v1")], 1_000_000).unwrap();

        assert!(cache.read_at(&path, 1_000_000 + 120_000).is_none());
        assert!(cache.read_at(&path, 1_000_000 + 300_000).is_none());
    }

    #[test]
    fn structural_problems_are_misses() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("c.json");
        let cache = VersionCache::default();
        let now = now_millis();

        assert!(cache.read_at(&path, now).is_none());
        for body in [
            "not json".to_string(),
            format!("{{\"timestamp\": \"{now}\", \"versions\": []}}"),
            format!("{{\"timestamp\": {now}, \"versions\": {{}}}}"),
            format!("{{\"timestamp\": {now}}}"),
            "[]".to_string(),
        ] {
            fs::write(&path, body).unwrap();
            assert!(cache.read_at(&path, now).is_none());
        }
    }

    #[test]
    fn malformed_entries_are_dropped_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("c.json");
        let now = now_millis();
        let good = serde_json::to_value(version("v1")).unwrap();
        let body = json!({ "timestamp": now, "versions": [good, { "version": 5 }, "junk"] });
        fs::write(&path, body.to_string()).unwrap();

        let hit = VersionCache::default().read_at(&path, now).unwrap();
        assert_eq!(hit, vec![version("v1")]);
    }

    #[test]
    fn empty_list_is_still_a_hit() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("c.json");
        let cache = VersionCache::default();
        cache.write(&path, &[]).unwrap();
        assert_eq!(cache.read(&path), Some(vec![]));
    }
}
