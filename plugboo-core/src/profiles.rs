use crate::error::{CoreError, CoreResult};
use crate::events::{CoreEvent, EventBus};
use crate::games::GameRegistry;
use crate::jobs::{JobHandle, JobRegistry};
use crate::loader::LoaderInstance;
use crate::loader_install::LoaderInstaller;
use crate::mods::Mod;
use crate::profile::{load_profiles, LoaderStatus, Profile};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Profile names double as directory names, so they must be a single plain segment.
fn check_name(name: &str) -> CoreResult<()> {
    if name.trim().is_empty() {
        return Err(CoreError::NameCannotBeEmpty);
    }
    let bad = name != name.trim()
        || name == "."
        || name == ".."
        || name.chars().any(|c| matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control());
    if bad {
        return Err(CoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Creates the profile directory, failing if it is already there. Two creations racing for
/// the same name cannot both succeed.
fn claim_dir(root: &Path) -> CoreResult<()> {
    if let Some(parent) = root.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
    }
    match std::fs::create_dir(root) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(CoreError::ProfileExists(root.to_path_buf())),
        Err(e) => Err(CoreError::io(root, e)),
    }
}

/// Owns the loaded profiles and runs loader installs for them.
pub struct ProfileStore {
    root: PathBuf,
    profiles: Arc<RwLock<HashMap<String, Profile>>>,
    games: Arc<dyn GameRegistry>,
    installer: Arc<LoaderInstaller>,
    jobs: JobRegistry<()>,
    events: EventBus,
}

impl ProfileStore {
    pub fn new(root: impl Into<PathBuf>, games: Arc<dyn GameRegistry>, installer: Arc<LoaderInstaller>, events: EventBus) -> Self {
        Self {
            root: root.into(),
            profiles: Arc::new(RwLock::new(HashMap::new())),
            games,
            installer,
            jobs: JobRegistry::new(),
            events,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Replaces the in-memory set with what is on disk. Profiles of unknown games are
    /// skipped; the others are `Ready` when their loader files are present.
    pub fn load_all(&self) -> CoreResult<Vec<Profile>> {
        let loaded = load_profiles(&self.root).map_err(|e| CoreError::io(&self.root, format!("{e:#}")))?;
        let mut map = HashMap::new();
        for mut profile in loaded {
            let Some(game) = self.games.game(&profile.game_id) else {
                warn!("Skipping profile '{}': unknown game '{}'", profile.name, profile.game_id);
                continue;
            };
            let ready = profile
                .loader
                .as_ref()
                .and_then(|l| game.loader(&l.id))
                .map(|d| d.is_installed_in(&profile.root))
                .unwrap_or(false);
            profile.status = if ready { LoaderStatus::Ready } else { LoaderStatus::NotInstalled };
            map.insert(profile.id.clone(), profile);
        }
        info!("Loaded {} profiles", map.len());
        let mut profiles: Vec<Profile> = map.values().cloned().collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        *self.profiles.write() = map;
        Ok(profiles)
    }

    /// Validates, persists and registers a new profile, then starts its loader install.
    /// The profile is visible (as `Installing`) before the install finishes.
    pub async fn create(
        &self,
        game_id: &str,
        name: &str,
        loader_id: &str,
        version_label: &str,
    ) -> CoreResult<(Profile, JobHandle<()>)> {
        check_name(name)?;
        let game = self.games.game(game_id).ok_or_else(|| CoreError::GameNotFound(game_id.to_string()))?;
        let loader = game.loader(loader_id).ok_or_else(|| CoreError::LoaderNotFound(loader_id.to_string()))?;
        let versions = self.installer.resolver().resolve(loader).await;
        if !versions.iter().any(|v| v.version == version_label) {
            return Err(CoreError::VersionNotFound(version_label.to_string()));
        }

        let root = self.root.join(name);
        claim_dir(&root)?;
        let profile = Profile::new(
            game_id,
            name,
            root.clone(),
            Some(LoaderInstance { id: loader.id.clone(), version: version_label.to_string() }),
        );
        if let Err(e) = profile.save() {
            let _ = std::fs::remove_dir_all(&root);
            return Err(CoreError::io(&root, format!("{e:#}")));
        }
        info!("Created profile '{}' ({}) for {}", profile.name, profile.id, game_id);
        self.profiles.write().insert(profile.id.clone(), profile.clone());

        let job = self.install_loader(&profile.id)?;
        let profile = self.get(&profile.id).unwrap_or(profile);
        Ok((profile, job))
    }

    /// (Re)runs the loader install of a profile in the background. A second request while
    /// one is running joins it.
    pub fn install_loader(&self, profile_id: &str) -> CoreResult<JobHandle<()>> {
        let profile = self.get(profile_id).ok_or_else(|| CoreError::ProfileNotFound(profile_id.to_string()))?;
        let version = profile
            .loader
            .as_ref()
            .map(|l| l.version.clone())
            .ok_or_else(|| CoreError::LoaderNotFound(String::new()))?;

        self.set_status(profile_id, LoaderStatus::Installing);

        let installer = Arc::clone(&self.installer);
        let profiles = Arc::clone(&self.profiles);
        let events = self.events.clone();
        let id = profile_id.to_string();
        Ok(self.jobs.spawn(loader_job_key(profile_id), async move {
            let result = installer.install(&profile, &version).await;
            let status = match &result {
                Ok(()) => LoaderStatus::Ready,
                Err(e) => {
                    error!("Loader install for profile '{}' failed: {}", profile.name, e);
                    LoaderStatus::NotInstalled
                }
            };
            if let Some(p) = profiles.write().get_mut(&id) {
                p.status = status;
            }
            events.emit(CoreEvent::LoaderInstalled { profile_id: id, success: result.is_ok() });
            result
        }))
    }

    pub fn is_installing(&self, profile_id: &str) -> bool {
        self.jobs.contains(&loader_job_key(profile_id))
    }

    pub fn get(&self, profile_id: &str) -> Option<Profile> {
        self.profiles.read().get(profile_id).cloned()
    }

    /// Profiles sorted by name, optionally restricted to one game.
    pub fn list(&self, game_id: Option<&str>) -> Vec<Profile> {
        let mut out: Vec<Profile> = self
            .profiles
            .read()
            .values()
            .filter(|p| game_id.map_or(true, |g| p.game_id == g))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Adds or replaces a mod in the profile's in-memory list.
    pub fn register_mod(&self, profile_id: &str, m: Mod) -> CoreResult<()> {
        let mut profiles = self.profiles.write();
        let profile = profiles.get_mut(profile_id).ok_or_else(|| CoreError::ProfileNotFound(profile_id.to_string()))?;
        profile.mods.retain(|existing| existing.id != m.id);
        profile.mods.push(m);
        profile.mods.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(())
    }

    pub fn unregister_mod(&self, profile_id: &str, mod_id: &str) {
        if let Some(profile) = self.profiles.write().get_mut(profile_id) {
            profile.mods.retain(|m| m.id != mod_id);
        }
    }

    /// Removes the profile and its directory tree. Refused while its loader is installing;
    /// callers holding other jobs for the profile must check those themselves.
    pub async fn delete(&self, profile_id: &str) -> CoreResult<()> {
        if self.is_installing(profile_id) {
            return Err(CoreError::InstallInProgress(profile_id.to_string()));
        }
        let profile = self
            .profiles
            .write()
            .remove(profile_id)
            .ok_or_else(|| CoreError::ProfileNotFound(profile_id.to_string()))?;
        if profile.root.exists() {
            tokio::fs::remove_dir_all(&profile.root).await.map_err(|e| CoreError::io(&profile.root, e))?;
        }
        info!("Deleted profile '{}' ({})", profile.name, profile.id);
        Ok(())
    }

    fn set_status(&self, profile_id: &str, status: LoaderStatus) {
        if let Some(p) = self.profiles.write().get_mut(profile_id) {
            p.status = status;
        }
    }
}

fn loader_job_key(profile_id: &str) -> String {
    format!("loader:{profile_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_must_be_single_plain_segments() {
        assert_eq!(check_name("").unwrap_err().reason(), "NAME_CANNOT_BE_EMPTY");
        assert_eq!(check_name("   ").unwrap_err().reason(), "NAME_CANNOT_BE_EMPTY");
        assert_eq!(check_name("a/b").unwrap_err().reason(), "INVALID_NAME");
        assert_eq!(check_name("..").unwrap_err().reason(), "INVALID_NAME");
        assert_eq!(check_name(" padded").unwrap_err().reason(), "INVALID_NAME");
        assert!(check_name("Main profile (1)").is_ok());
    }

    #[test]
    fn a_directory_can_be_claimed_once() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("profiles").join("Main");
        claim_dir(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(claim_dir(&root).unwrap_err().reason(), "PROFILE_EXISTS");
    }

    #[test]
    fn racing_claims_have_one_winner() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("Main");
        let winners = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| claim_dir(&root).is_ok())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count()
        });
        assert_eq!(winners, 1);
    }
}
