use crate::archive::ExtractRules;
use crate::paths::sanitize_component;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderFile {
    pub name: String,
    pub url: String,
}

/// One installable release of a loader: a development and a play build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderVersion {
    pub version: String,
    pub dev_file: LoaderFile,
    pub play_file: LoaderFile,
}

/// The loader a profile was created with. Only the version label is stored; the
/// files are looked up again through the resolver when installing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderInstance {
    pub id: String,
    pub version: String,
}

/// Static description of a loader and where its releases come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderDescriptor {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub repo: String,
    /// Top-level folder the release archives wrap their contents in.
    pub wrapper_folder: String,
    pub config_file: String,
    pub launcher_exe: String,
}

impl LoaderDescriptor {
    pub fn migoto(owner: &str, repo: &str) -> Self {
        Self {
            id: "3dmigoto".to_string(),
            name: "3DMigoto".to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            wrapper_folder: "3dmigoto".to_string(),
            config_file: "d3dx.ini".to_string(),
            launcher_exe: "3DMigoto Loader.exe".to_string(),
        }
    }

    /// Version-cache file stem; distinct per loader and per release source.
    pub fn cache_key(&self) -> String {
        sanitize_component(&format!("{}-{}-{}", self.id, self.owner, self.repo))
    }

    pub fn extract_rules(&self) -> ExtractRules {
        ExtractRules::loader(&self.wrapper_folder, &self.config_file)
    }

    pub fn is_installed_in(&self, profile_root: &Path) -> bool {
        profile_root.join(&self.launcher_exe).is_file() && profile_root.join(&self.config_file).is_file()
    }
}
