use crate::archive::{extract_archive, is_readable_archive};
use crate::error::{CoreError, CoreResult};
use crate::events::{CoreEvent, EventBus};
use crate::games::GameRegistry;
use crate::http::Downloader;
use crate::ini::patch_loader_config;
use crate::jobs::JobRegistry;
use crate::paths::DataLayout;
use crate::profile::Profile;
use crate::resolver::LoaderVersionResolver;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Puts a loader release into a profile: resolve, download once per game and version,
/// unpack, then point the loader's config at the game.
pub struct LoaderInstaller {
    games: Arc<dyn GameRegistry>,
    resolver: Arc<LoaderVersionResolver>,
    downloader: Arc<dyn Downloader>,
    layout: DataLayout,
    events: EventBus,
    /// Archive fetches keyed by destination path, so profiles sharing a version share one download.
    downloads: JobRegistry<()>,
}

/// Makes sure a readable archive sits at `archive`, downloading it when missing or corrupt.
async fn fetch_archive(
    downloader: Arc<dyn Downloader>,
    events: EventBus,
    url: String,
    archive: PathBuf,
    task: String,
) -> CoreResult<()> {
    if archive.exists() && !is_readable_archive(&archive) {
        warn!("Cached loader archive {} is unreadable, downloading again", archive.display());
        tokio::fs::remove_file(&archive).await.map_err(|e| CoreError::io(&archive, e))?;
    }
    if archive.exists() {
        info!("Reusing cached archive {}", archive.display());
        return Ok(());
    }
    let progress = move |percent: u8| events.emit(CoreEvent::DownloadProgress { task: task.clone(), percent });
    downloader
        .download(&url, &archive, &progress)
        .await
        .map_err(|e| CoreError::DownloadFailed { url: url.clone(), reason: format!("{e:#}") })?;
    Ok(())
}

impl LoaderInstaller {
    pub fn new(
        games: Arc<dyn GameRegistry>,
        resolver: Arc<LoaderVersionResolver>,
        downloader: Arc<dyn Downloader>,
        layout: DataLayout,
        events: EventBus,
    ) -> Self {
        Self { games, resolver, downloader, layout, events, downloads: JobRegistry::new() }
    }

    pub fn resolver(&self) -> &LoaderVersionResolver {
        &self.resolver
    }

    /// Every precondition is checked before anything on disk is touched.
    pub async fn install(&self, profile: &Profile, version_label: &str) -> CoreResult<()> {
        let game = self.games.game(&profile.game_id).ok_or_else(|| CoreError::GameNotFound(profile.game_id.clone()))?;
        let install_path = game
            .install_path
            .clone()
            .ok_or_else(|| CoreError::GameNotInitialized(profile.game_id.clone()))?;
        let loader_id = profile.loader.as_ref().map(|l| l.id.as_str()).unwrap_or_default();
        let loader = game.loader(loader_id).ok_or_else(|| CoreError::LoaderNotFound(loader_id.to_string()))?;
        let version = self
            .resolver
            .resolve(loader)
            .await
            .into_iter()
            .find(|v| v.version == version_label)
            .ok_or_else(|| CoreError::VersionNotFound(version_label.to_string()))?;

        let archive = self
            .layout
            .loader_archive_path(&game.info.id, &loader.id, &version.version, &version.play_file.name);
        let fetch = fetch_archive(
            Arc::clone(&self.downloader),
            self.events.clone(),
            version.play_file.url.clone(),
            archive.clone(),
            format!("loader:{}", profile.id),
        );
        self.downloads.spawn(archive.to_string_lossy(), fetch).wait().await?;

        let root = profile.root.clone();
        let rules = loader.extract_rules();
        let src = archive.clone();
        let report = tokio::task::spawn_blocking(move || extract_archive(&src, &root, &rules))
            .await
            .map_err(|e| CoreError::TaskFailed(e.to_string()))?
            .map_err(|e| CoreError::ExtractionFailed(format!("{e:#}")))?;
        info!(
            "Installed {} {} into '{}' ({} written, {} kept)",
            loader.name, version.version, profile.name, report.files_written, report.files_kept
        );

        if !patch_loader_config(&profile.root.join(&loader.config_file), &install_path) {
            warn!("Loader config of profile '{}' was not patched; the loader may not find the game", profile.name);
        }
        Ok(())
    }
}
