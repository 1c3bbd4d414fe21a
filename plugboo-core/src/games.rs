use crate::error::{CoreError, CoreResult};
use crate::loader::LoaderDescriptor;
use crate::settings::AppSettings;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameInfo {
    pub id: String,
    pub name: String,
    pub developer: String,
    /// Executable expected directly inside a valid install folder.
    pub executable: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    pub info: GameInfo,
    pub install_path: Option<PathBuf>,
    pub loaders: Vec<LoaderDescriptor>,
    /// Game id on the content catalog, when packages can be installed for it.
    pub catalog_id: Option<u64>,
}

impl Game {
    pub fn validate_path(&self, path: &Path) -> bool {
        path.join(&self.info.executable).is_file()
    }

    pub fn loader(&self, id: &str) -> Option<&LoaderDescriptor> {
        self.loaders.iter().find(|l| l.id == id)
    }
}

pub trait GameRegistry: Send + Sync {
    fn game(&self, id: &str) -> Option<Game>;
    fn games(&self) -> Vec<Game>;
    fn set_install_path(&self, id: &str, path: Option<PathBuf>) -> CoreResult<()>;
}

/// In-memory registry of the supported games. Install paths are the only mutable part.
pub struct GameLibrary {
    games: RwLock<Vec<Game>>,
}

fn hoyoverse(id: &str, name: &str, executable: &str, owner: &str, repo: &str, catalog_id: u64) -> Game {
    Game {
        info: GameInfo {
            id: id.to_string(),
            name: name.to_string(),
            developer: "HoYoverse".to_string(),
            executable: executable.to_string(),
        },
        install_path: None,
        loaders: vec![LoaderDescriptor::migoto(owner, repo)],
        catalog_id: Some(catalog_id),
    }
}

impl GameLibrary {
    pub fn new(games: Vec<Game>) -> Self {
        Self { games: RwLock::new(games) }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            hoyoverse("genshin_impact", "Genshin Impact", "GenshinImpact.exe", "SilentNightSound", "GI-Model-Importer", 8552),
            hoyoverse("honkai_star_rail", "Honkai: Star Rail", "StarRail.exe", "SilentNightSound", "SR-Model-Importer", 18366),
            hoyoverse("zenless_zone_zero", "Zenless Zone Zero", "ZenlessZoneZero.exe", "leotorrez", "ZZ-Model-Importer", 19567),
        ])
    }

    /// Applies stored install paths. Paths that no longer validate are dropped from
    /// `settings`; returns true when `settings` changed and should be saved.
    pub fn apply_settings(&self, settings: &mut AppSettings) -> bool {
        let mut changed = false;
        let mut games = self.games.write();
        settings.game_install_paths.retain(|id, path| {
            let Some(game) = games.iter_mut().find(|g| g.info.id == *id) else {
                warn!("Dropping install path for unknown game '{}'", id);
                changed = true;
                return false;
            };
            if !game.validate_path(path) {
                warn!("Invalid installation path for game '{}': {}", game.info.name, path.display());
                changed = true;
                return false;
            }
            game.install_path = Some(path.clone());
            true
        });
        changed
    }
}

impl GameRegistry for GameLibrary {
    fn game(&self, id: &str) -> Option<Game> {
        self.games.read().iter().find(|g| g.info.id == id).cloned()
    }

    fn games(&self) -> Vec<Game> {
        self.games.read().clone()
    }

    fn set_install_path(&self, id: &str, path: Option<PathBuf>) -> CoreResult<()> {
        let mut games = self.games.write();
        let game = games.iter_mut().find(|g| g.info.id == id).ok_or_else(|| CoreError::GameNotFound(id.to_string()))?;
        game.install_path = path;
        Ok(())
    }
}
