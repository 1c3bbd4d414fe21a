use std::path::{Path, PathBuf};

/// On-disk layout below the application data directory.
///
/// ```text
/// <root>/settings.toml
/// <root>/logs/
/// <root>/profiles/<name>/profile.json
/// <root>/profiles/<name>/mods/<packageId>/{modinfo.json,icon.png,data/}
/// <root>/loaders/<cacheKey>.json
/// <root>/loaders/<gameId>/<loaderId>/<version>/<archive>.zip
/// ```
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    pub fn loaders_dir(&self) -> PathBuf {
        self.root.join("loaders")
    }

    pub fn version_cache_path(&self, cache_key: &str) -> PathBuf {
        self.loaders_dir().join(format!("{}.json", sanitize_component(cache_key)))
    }

    /// Shared by every profile of the same game that picks the same loader version.
    pub fn loader_archive_path(&self, game_id: &str, loader_id: &str, version: &str, archive_name: &str) -> PathBuf {
        self.loaders_dir()
            .join(sanitize_component(game_id))
            .join(sanitize_component(loader_id))
            .join(sanitize_component(version))
            .join(sanitize_component(archive_name))
    }
}

/// Maps an arbitrary label (release tag, package id, asset name) onto a single safe path segment.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ' | '+') { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_separators_and_dots() {
        assert_eq!(sanitize_component("v1.2/beta"), "v1.2_beta");
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component("C:\\x"), "C__x");
        assert_eq!(sanitize_component("3dmigoto-GIMI-for-playing-mods.zip"), "3dmigoto-GIMI-for-playing-mods.zip");
    }

    #[test]
    fn archive_path_is_game_scoped() {
        let layout = DataLayout::new("/data");
        let a = layout.loader_archive_path("genshin_impact", "3dmigoto", "v7.0", "play.zip");
        assert_eq!(a, PathBuf::from("/data/loaders/genshin_impact/3dmigoto/v7.0/play.zip"));
        assert_eq!(layout.version_cache_path("3dmigoto/x"), PathBuf::from("/data/loaders/3dmigoto_x.json"));
    }
}
