use crate::archive::{extract_archive, ExtractRules};
use crate::catalog::{ContentCatalog, Package, PackageFile};
use crate::error::{CoreError, CoreResult};
use crate::events::{CoreEvent, EventBus};
use crate::http::Downloader;
use crate::jobs::{JobHandle, JobRegistry};
use crate::mods::{Mod, DATA_DIR, ICON_FILE, MOD_INFO_FILE};
use crate::paths::sanitize_component;
use crate::profiles::ProfileStore;
use anyhow::Context;
use md5::{Digest, Md5};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Where a new version is unpacked before it replaces `data/`.
const STAGING_DIR: &str = "data.new";

fn job_prefix(profile_id: &str) -> String {
    format!("mod:{profile_id}:")
}

fn file_md5(path: &Path) -> anyhow::Result<String> {
    let mut file = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Installs content packages into profiles. At most one install runs per
/// (profile, package); repeated requests join the running one.
pub struct ModInstaller {
    store: Arc<ProfileStore>,
    downloader: Arc<dyn Downloader>,
    events: EventBus,
    jobs: JobRegistry<Mod>,
}

struct ModJob {
    store: Arc<ProfileStore>,
    downloader: Arc<dyn Downloader>,
    events: EventBus,
    catalog: Arc<dyn ContentCatalog>,
    profile_id: String,
    package_id: String,
    task: String,
}

impl ModInstaller {
    pub fn new(store: Arc<ProfileStore>, downloader: Arc<dyn Downloader>, events: EventBus) -> Self {
        Self { store, downloader, events, jobs: JobRegistry::new() }
    }

    /// Starts (or joins) the install of `package_id`. Only an unknown profile is reported
    /// here; everything else surfaces through the handle and a `PackageInstalled` event.
    pub fn install(&self, profile_id: &str, catalog: Arc<dyn ContentCatalog>, package_id: &str) -> CoreResult<JobHandle<Mod>> {
        if self.store.get(profile_id).is_none() {
            return Err(CoreError::ProfileNotFound(profile_id.to_string()));
        }
        let task = format!("{}{}", job_prefix(profile_id), package_id);
        let job = ModJob {
            store: Arc::clone(&self.store),
            downloader: Arc::clone(&self.downloader),
            events: self.events.clone(),
            catalog,
            profile_id: profile_id.to_string(),
            package_id: package_id.to_string(),
            task: task.clone(),
        };
        Ok(self.jobs.spawn(task, job.run()))
    }

    /// Package ids currently being installed into the profile.
    pub fn pending(&self, profile_id: &str) -> Vec<String> {
        let prefix = job_prefix(profile_id);
        self.jobs
            .keys_with_prefix(&prefix)
            .into_iter()
            .map(|k| k[prefix.len()..].to_string())
            .collect()
    }

    pub fn has_pending(&self, profile_id: &str) -> bool {
        !self.pending(profile_id).is_empty()
    }
}

impl ModJob {
    async fn run(self) -> CoreResult<Mod> {
        let result = self.install().await;
        match &result {
            Ok(m) => info!("Installed package {} ({}) into profile {}", m.id, m.name, self.profile_id),
            Err(e) => error!("Package {} install into profile {} failed: {}", self.package_id, self.profile_id, e),
        }
        self.events.emit(CoreEvent::PackageInstalled {
            profile_id: self.profile_id.clone(),
            package_id: self.package_id.clone(),
            success: result.is_ok(),
        });
        result
    }

    async fn install(&self) -> CoreResult<Mod> {
        let package = match self.catalog.get_package(&self.package_id).await {
            Ok(Some(p)) => p,
            Ok(None) => return Err(CoreError::PackageNotFound(self.package_id.clone())),
            Err(e) => {
                warn!("Catalog lookup for package {} failed: {:#}", self.package_id, e);
                return Err(CoreError::PackageNotFound(self.package_id.clone()));
            }
        };
        let file = package.files.first().ok_or_else(|| CoreError::PackageNotFound(self.package_id.clone()))?;
        let profile = self
            .store
            .get(&self.profile_id)
            .ok_or_else(|| CoreError::ProfileNotFound(self.profile_id.clone()))?;

        // The new files are unpacked next to the installed ones; the old mod is only
        // replaced once they are complete.
        let mod_dir = profile.mod_dir(&package.id);
        let staging = mod_dir.join(STAGING_DIR);
        let archive = mod_dir.join(sanitize_component(&file.name));
        if let Err(e) = self.stage(file, &archive, &staging).await {
            if staging.exists() {
                let _ = tokio::fs::remove_dir_all(&staging).await;
            }
            let _ = tokio::fs::remove_file(&archive).await;
            return Err(e);
        }

        remove_if_exists(&mod_dir.join(MOD_INFO_FILE)).await?;
        self.store.unregister_mod(&self.profile_id, &package.id);
        let data_dir = mod_dir.join(DATA_DIR);
        if data_dir.exists() {
            tokio::fs::remove_dir_all(&data_dir).await.map_err(|e| CoreError::io(&data_dir, e))?;
        }
        tokio::fs::rename(&staging, &data_dir).await.map_err(|e| CoreError::io(&staging, e))?;

        self.fetch_icon(&package, &mod_dir).await;

        let record = Mod {
            id: package.id.clone(),
            name: package.name.clone(),
            author: package.author.clone(),
            version: package.version.clone(),
            enabled: true,
        };
        record.write_info(&mod_dir).map_err(|e| CoreError::io(&mod_dir, format!("{e:#}")))?;
        self.store.register_mod(&self.profile_id, record.clone())?;
        Ok(record)
    }

    /// Downloads, verifies and unpacks `file` into `staging`.
    async fn stage(&self, file: &PackageFile, archive: &Path, staging: &Path) -> CoreResult<()> {
        if staging.exists() {
            tokio::fs::remove_dir_all(staging).await.map_err(|e| CoreError::io(staging, e))?;
        }
        let events = self.events.clone();
        let task = self.task.clone();
        let progress = move |percent: u8| events.emit(CoreEvent::DownloadProgress { task: task.clone(), percent });
        self.downloader
            .download(&file.url, archive, &progress)
            .await
            .map_err(|e| CoreError::DownloadFailed { url: file.url.clone(), reason: format!("{e:#}") })?;

        if let Some(expected) = &file.md5 {
            verify_md5(archive, expected).await?;
        }

        let src = archive.to_path_buf();
        let dest = staging.to_path_buf();
        tokio::task::spawn_blocking(move || extract_archive(&src, &dest, &ExtractRules::verbatim()))
            .await
            .map_err(|e| CoreError::TaskFailed(e.to_string()))?
            .map_err(|e| CoreError::ExtractionFailed(format!("{e:#}")))?;
        if let Err(e) = tokio::fs::remove_file(archive).await {
            warn!("Could not remove downloaded archive {}: {}", archive.display(), e);
        }
        Ok(())
    }

    async fn fetch_icon(&self, package: &Package, mod_dir: &Path) {
        let Some(media) = package.media.first() else { return };
        let icon: PathBuf = mod_dir.join(ICON_FILE);
        if let Err(e) = self.downloader.download(media.icon_url(), &icon, &|_| {}).await {
            warn!("Icon download for package {} failed: {:#}", package.id, e);
        }
    }
}

async fn remove_if_exists(path: &Path) -> CoreResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CoreError::io(path, e)),
    }
}

async fn verify_md5(path: &Path, expected: &str) -> CoreResult<()> {
    let target = path.to_path_buf();
    let actual = tokio::task::spawn_blocking(move || file_md5(&target))
        .await
        .map_err(|e| CoreError::TaskFailed(e.to_string()))?
        .map_err(|e| CoreError::io(path, format!("{e:#}")))?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        let _ = tokio::fs::remove_file(path).await;
        return Err(CoreError::ChecksumMismatch { path: path.to_path_buf(), expected: expected.to_string(), actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_matches_known_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("f");
        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(file_md5(&path).unwrap(), "5d41402abc4b2a76b9719d911017c592");
    }

    #[tokio::test]
    async fn checksum_mismatch_removes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("f.zip");
        std::fs::write(&path, b"hello").unwrap();
        let err = verify_md5(&path, "00000000000000000000000000000000").await.unwrap_err();
        assert_eq!(err.reason(), "CHECKSUM_MISMATCH");
        assert!(!path.exists());
        std::fs::write(&path, b"hello").unwrap();
        verify_md5(&path, "5D41402ABC4B2A76B9719D911017C592").await.unwrap();
    }

    #[test]
    fn pending_strips_job_prefix() {
        assert_eq!(job_prefix("p1"), "mod:p1:");
    }
}
