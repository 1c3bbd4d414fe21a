use crate::catalog::{ContentCatalog, GameBananaCatalog, Package};
use crate::error::{CoreError, CoreResult};
use crate::events::{CoreEvent, EventBus};
use crate::games::{Game, GameLibrary, GameRegistry};
use crate::github::{GitHubReleaseFeed, ReleaseFeed};
use crate::http::{Downloader, HttpDownloader};
use crate::jobs::JobHandle;
use crate::launch::ProcessLauncher;
use crate::loader::{LoaderDescriptor, LoaderVersion};
use crate::loader_install::LoaderInstaller;
use crate::mod_install::ModInstaller;
use crate::mods::Mod;
use crate::paths::DataLayout;
use crate::profile::{LoaderStatus, Profile};
use crate::profiles::ProfileStore;
use crate::resolver::LoaderVersionResolver;
use crate::settings::{AppSettings, SettingsStore};
use crate::version_cache::VersionCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// External collaborators the core talks to.
pub struct Services {
    pub feed: Arc<dyn ReleaseFeed>,
    pub downloader: Arc<dyn Downloader>,
    /// Content catalog per game id.
    pub catalogs: HashMap<String, Arc<dyn ContentCatalog>>,
}

impl Services {
    /// GitHub releases, plain HTTP downloads and GameBanana for every game that has a
    /// catalog id.
    pub fn live(settings: &AppSettings, games: &[Game]) -> Self {
        let catalogs = games
            .iter()
            .filter_map(|g| {
                let catalog: Arc<dyn ContentCatalog> = Arc::new(GameBananaCatalog::new(g.catalog_id?));
                Some((g.info.id.clone(), catalog))
            })
            .collect();
        Self {
            feed: Arc::new(GitHubReleaseFeed::new(settings.github_token.clone())),
            downloader: Arc::new(HttpDownloader::new()),
            catalogs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoaderListing {
    pub loader: LoaderDescriptor,
    pub versions: Vec<LoaderVersion>,
}

/// Application core: every request the front-end can make, plus the event stream.
pub struct Plugboo {
    layout: DataLayout,
    settings_store: SettingsStore,
    settings: Mutex<AppSettings>,
    games: Arc<GameLibrary>,
    catalogs: HashMap<String, Arc<dyn ContentCatalog>>,
    resolver: Arc<LoaderVersionResolver>,
    profiles: Arc<ProfileStore>,
    mods: ModInstaller,
    launcher: ProcessLauncher,
    events: EventBus,
}

fn load_settings(store: &SettingsStore) -> AppSettings {
    store.load().unwrap_or_else(|e| {
        warn!("Falling back to default settings: {:#}", e);
        AppSettings::default()
    })
}

impl Plugboo {
    /// Wires the live services below `data_dir`.
    pub fn with_defaults(data_dir: &Path) -> CoreResult<Self> {
        let store = SettingsStore::new(data_dir).map_err(|e| CoreError::io(data_dir, format!("{e:#}")))?;
        let settings = load_settings(&store);
        let services = Services::live(&settings, &GameLibrary::builtin().games());
        Self::new(data_dir, services)
    }

    pub fn new(data_dir: &Path, services: Services) -> CoreResult<Self> {
        let layout = DataLayout::new(data_dir);
        let settings_store = SettingsStore::new(data_dir).map_err(|e| CoreError::io(data_dir, format!("{e:#}")))?;
        let mut settings = load_settings(&settings_store);

        let games = Arc::new(GameLibrary::builtin());
        if games.apply_settings(&mut settings) {
            if let Err(e) = settings_store.save(&settings) {
                warn!("Failed to save cleaned settings: {:#}", e);
            }
        }
        let registry: Arc<dyn GameRegistry> = games.clone();

        let events = EventBus::default();
        let resolver = Arc::new(LoaderVersionResolver::new(
            services.feed,
            VersionCache::new(settings.version_cache_ttl()),
            layout.clone(),
        ));
        let installer = Arc::new(LoaderInstaller::new(
            Arc::clone(&registry),
            Arc::clone(&resolver),
            Arc::clone(&services.downloader),
            layout.clone(),
            events.clone(),
        ));
        let profiles = Arc::new(ProfileStore::new(layout.profiles_dir(), registry, installer, events.clone()));
        profiles.load_all()?;
        let mods = ModInstaller::new(Arc::clone(&profiles), services.downloader, events.clone());

        info!("Core ready at {}", layout.root().display());
        Ok(Self {
            layout,
            settings_store,
            settings: Mutex::new(settings),
            games,
            catalogs: services.catalogs,
            resolver,
            profiles,
            mods,
            launcher: ProcessLauncher::new(events.clone()),
            events,
        })
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    pub fn games(&self) -> Vec<Game> {
        self.games.games()
    }

    fn game(&self, game_id: &str) -> CoreResult<Game> {
        self.games.game(game_id).ok_or_else(|| CoreError::GameNotFound(game_id.to_string()))
    }

    /// The game's install path, if one has been set up.
    pub fn verify_game(&self, game_id: &str) -> CoreResult<PathBuf> {
        self.game(game_id)?.install_path.ok_or_else(|| CoreError::GameNotInitialized(game_id.to_string()))
    }

    pub fn setup_game(&self, game_id: &str, path: &Path) -> CoreResult<()> {
        let game = self.game(game_id)?;
        if game.install_path.is_some() {
            return Err(CoreError::GameAlreadyInitialized(game_id.to_string()));
        }
        if !game.validate_path(path) {
            return Err(CoreError::InvalidPath(path.to_path_buf()));
        }
        self.games.set_install_path(game_id, Some(path.to_path_buf()))?;

        let mut settings = self.settings.lock();
        settings.game_install_paths.insert(game_id.to_string(), path.to_path_buf());
        self.settings_store
            .save(&settings)
            .map_err(|e| CoreError::io(self.settings_store.path(), format!("{e:#}")))?;
        info!("Set up {} at {}", game.info.name, path.display());
        Ok(())
    }

    pub async fn loaders(&self, game_id: &str) -> CoreResult<Vec<LoaderListing>> {
        let game = self.game(game_id)?;
        let mut out = Vec::with_capacity(game.loaders.len());
        for loader in game.loaders {
            let versions = self.resolver.resolve(&loader).await;
            out.push(LoaderListing { loader, versions });
        }
        Ok(out)
    }

    pub async fn create_profile(
        &self,
        game_id: &str,
        name: &str,
        loader_id: &str,
        version: &str,
    ) -> CoreResult<(Profile, JobHandle<()>)> {
        self.profiles.create(game_id, name, loader_id, version).await
    }

    pub fn reinstall_loader(&self, profile_id: &str) -> CoreResult<JobHandle<()>> {
        self.profiles.install_loader(profile_id)
    }

    pub fn start_profile(&self, profile_id: &str) -> CoreResult<()> {
        let profile = self.profile(profile_id)?;
        if profile.status == LoaderStatus::Installing {
            return Err(CoreError::InstallInProgress(profile_id.to_string()));
        }
        let game = self.game(&profile.game_id)?;
        let loader_id = profile.loader.as_ref().map(|l| l.id.clone()).unwrap_or_default();
        let loader = game.loader(&loader_id).ok_or(CoreError::LoaderNotFound(loader_id.clone()))?;
        self.launcher.launch(&profile, loader)
    }

    fn catalog_for(&self, game_id: &str) -> CoreResult<Arc<dyn ContentCatalog>> {
        self.game(game_id)?;
        self.catalogs
            .get(game_id)
            .cloned()
            .ok_or_else(|| CoreError::PackageNotFound(format!("no catalog for {game_id}")))
    }

    pub async fn search_packages(&self, game_id: &str, query: &str, page: u32) -> CoreResult<Vec<Package>> {
        let catalog = self.catalog_for(game_id)?;
        catalog.search_packages(query, page).await.map_err(|e| CoreError::DownloadFailed {
            url: format!("catalog search '{query}'"),
            reason: format!("{e:#}"),
        })
    }

    pub fn install_package(&self, profile_id: &str, package_id: &str) -> CoreResult<JobHandle<Mod>> {
        let profile = self.profile(profile_id)?;
        let catalog = self.catalog_for(&profile.game_id)?;
        self.mods.install(profile_id, catalog, package_id)
    }

    pub fn pending_packages(&self, profile_id: &str) -> Vec<String> {
        self.mods.pending(profile_id)
    }

    pub fn profiles(&self, game_id: Option<&str>) -> Vec<Profile> {
        self.profiles.list(game_id)
    }

    pub fn profile(&self, profile_id: &str) -> CoreResult<Profile> {
        self.profiles.get(profile_id).ok_or_else(|| CoreError::ProfileNotFound(profile_id.to_string()))
    }

    pub fn mods(&self, profile_id: &str) -> CoreResult<Vec<Mod>> {
        Ok(self.profile(profile_id)?.mods)
    }

    pub fn mod_icon(&self, profile_id: &str, mod_id: &str) -> CoreResult<Option<PathBuf>> {
        Ok(self.profile(profile_id)?.icon_path(mod_id))
    }

    pub fn reload_profiles(&self) -> CoreResult<Vec<Profile>> {
        self.profiles.load_all()
    }

    pub async fn delete_profile(&self, profile_id: &str) -> CoreResult<()> {
        if self.mods.has_pending(profile_id) {
            return Err(CoreError::InstallInProgress(profile_id.to_string()));
        }
        self.profiles.delete(profile_id).await
    }
}
