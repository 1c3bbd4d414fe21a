use crate::github::{GitHubAsset, GitHubRelease, ReleaseFeed};
use crate::loader::{LoaderDescriptor, LoaderFile, LoaderVersion};
use crate::paths::DataLayout;
use crate::version_cache::VersionCache;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const ZIP_CONTENT_TYPES: [&str; 2] = ["application/zip", "application/x-zip-compressed"];

fn is_zip_asset(asset: &GitHubAsset) -> bool {
    asset
        .content_type
        .as_deref()
        .map(|ct| ZIP_CONTENT_TYPES.iter().any(|z| ct.eq_ignore_ascii_case(z)))
        .unwrap_or(false)
}

fn to_file(asset: &GitHubAsset) -> Option<LoaderFile> {
    Some(LoaderFile { name: asset.name.clone(), url: asset.browser_download_url.clone()? })
}

/// Turns releases into versions. A release only counts when it ships both a
/// development and a play zip; anything else is dropped.
pub fn classify_releases(releases: &[GitHubRelease]) -> Vec<LoaderVersion> {
    let mut versions = Vec::new();
    for release in releases {
        let Some(tag) = release.tag_name.as_deref() else {
            debug!("Skipping release without a tag");
            continue;
        };
        let mut dev: Option<LoaderFile> = None;
        let mut play: Option<LoaderFile> = None;
        for asset in release.assets.iter().filter(|a| is_zip_asset(a)) {
            let lower = asset.name.to_lowercase();
            if lower.contains("dev") {
                dev = to_file(asset).or(dev);
            } else if lower.contains("play") {
                play = to_file(asset).or(play);
            }
        }
        match (dev, play) {
            (Some(dev_file), Some(play_file)) => versions.push(LoaderVersion { version: tag.to_string(), dev_file, play_file }),
            _ => debug!("Release {} lacks a dev or play build, skipping", tag),
        }
    }
    versions
}

pub struct LoaderVersionResolver {
    feed: Arc<dyn ReleaseFeed>,
    cache: VersionCache,
    layout: DataLayout,
}

impl LoaderVersionResolver {
    pub fn new(feed: Arc<dyn ReleaseFeed>, cache: VersionCache, layout: DataLayout) -> Self {
        Self { feed, cache, layout }
    }

    /// Cached versions when fresh, otherwise a live fetch. Never fails: a fetch error
    /// yields an empty list and leaves the cache untouched.
    pub async fn resolve(&self, loader: &LoaderDescriptor) -> Vec<LoaderVersion> {
        let cache_path = self.layout.version_cache_path(&loader.cache_key());
        if let Some(versions) = self.cache.read(&cache_path) {
            debug!("Using {} cached versions for {}", versions.len(), loader.id);
            return versions;
        }

        info!("Fetching {} versions from {}/{}", loader.name, loader.owner, loader.repo);
        let releases = match self.feed.releases(&loader.owner, &loader.repo).await {
            Ok(r) => r,
            Err(e) => {
                error!("Failed to fetch versions for {} ({}/{}): {:#}", loader.id, loader.owner, loader.repo, e);
                return Vec::new();
            }
        };
        let versions = classify_releases(&releases);
        info!("Received {} installable versions for {}", versions.len(), loader.id);

        if let Err(e) = self.cache.write(&cache_path, &versions) {
            warn!("Failed to write version cache {}: {:#}", cache_path.display(), e);
        }
        versions
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn asset(name: &str, content_type: &str) -> GitHubAsset {
        GitHubAsset {
            name: name.into(),
            content_type: Some(content_type.into()),
            browser_download_url: Some(format!("https://example.invalid/{name}")),
            size: None,
        }
    }

    pub(crate) fn release(tag: &str, assets: Vec<GitHubAsset>) -> GitHubRelease {
        GitHubRelease { name: None, tag_name: Some(tag.into()), published_at: None, assets }
    }

    pub(crate) struct CountingFeed {
        pub calls: AtomicUsize,
        pub result: Option<Vec<GitHubRelease>>,
    }

    #[async_trait]
    impl ReleaseFeed for CountingFeed {
        async fn releases(&self, _owner: &str, _repo: &str) -> anyhow::Result<Vec<GitHubRelease>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().ok_or_else(|| anyhow::anyhow!("network down"))
        }
    }

    fn full_release(tag: &str) -> GitHubRelease {
        release(tag, vec![
            asset("3dmigoto-for-development.zip", "application/zip"),
            asset("3dmigoto-for-playing-mods.zip", "application/x-zip-compressed"),
        ])
    }

    #[test]
    fn partial_releases_contribute_nothing() {
        let releases = vec![
            full_release("v3"),
            release("v2", vec![asset("3dmigoto-for-playing-mods.zip", "application/zip")]),
            release("v1", vec![asset("3dmigoto-DEV.zip", "application/zip")]),
        ];
        let versions = classify_releases(&releases);
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version, "v3");
        assert_eq!(versions[0].dev_file.name, "3dmigoto-for-development.zip");
        assert_eq!(versions[0].play_file.name, "3dmigoto-for-playing-mods.zip");
    }

    #[test]
    fn non_zip_assets_are_ignored() {
        let releases = vec![release("v1", vec![
            asset("dev.zip", "application/zip"),
            asset("play.7z", "application/x-7z-compressed"),
        ])];
        assert!(classify_releases(&releases).is_empty());
    }

    #[test]
    fn matching_is_case_insensitive_and_keeps_feed_order() {
        let releases = vec![
            release("b", vec![asset("X-Dev.zip", "application/zip"), asset("X-PLAY.zip", "application/zip")]),
            full_release("a"),
        ];
        let tags: Vec<_> = classify_releases(&releases).into_iter().map(|v| v.version).collect();
        assert_eq!(tags, vec!["b", "a"]);
    }

    fn resolver(tmp: &std::path::Path, feed: Arc<CountingFeed>) -> LoaderVersionResolver {
        LoaderVersionResolver::new(feed, VersionCache::default(), DataLayout::new(tmp))
    }

    #[tokio::test]
    async fn fresh_cache_avoids_the_network() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = LoaderDescriptor::migoto("o", "r");
        let layout = DataLayout::new(tmp.path());
        let cached = classify_releases(&[full_release("cached")]);
        VersionCache::default().write(&layout.version_cache_path(&loader.cache_key()), &cached).unwrap();

        let feed = Arc::new(CountingFeed { calls: AtomicUsize::new(0), result: Some(vec![full_release("live")]) });
        let versions = resolver(tmp.path(), feed.clone()).resolve(&loader).await;
        assert_eq!(versions[0].version, "cached");
        assert_eq!(feed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_cache_triggers_fetch_and_rewrite() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = LoaderDescriptor::migoto("o", "r");
        let layout = DataLayout::new(tmp.path());
        let cache_path = layout.version_cache_path(&loader.cache_key());
        let cached = classify_releases(&[full_release("cached")]);
        VersionCache::default()
            .write_at(&cache_path, &cached, crate::version_cache::now_millis() - 300_000)
            .unwrap();

        let feed = Arc::new(CountingFeed { calls: AtomicUsize::new(0), result: Some(vec![full_release("live")]) });
        let versions = resolver(tmp.path(), feed.clone()).resolve(&loader).await;
        assert_eq!(versions[0].version, "live");
        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
        assert_eq!(VersionCache::default().read(&cache_path).unwrap()[0].version, "live");
    }

    #[tokio::test]
    async fn empty_result_is_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = LoaderDescriptor::migoto("o", "r");
        let feed = Arc::new(CountingFeed { calls: AtomicUsize::new(0), result: Some(vec![]) });
        let r = resolver(tmp.path(), feed.clone());
        assert!(r.resolve(&loader).await.is_empty());
        assert!(r.resolve(&loader).await.is_empty());
        assert_eq!(feed.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_failure_returns_empty_without_caching() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = LoaderDescriptor::migoto("o", "r");
        let feed = Arc::new(CountingFeed { calls: AtomicUsize::new(0), result: None });
        let versions = resolver(tmp.path(), feed.clone()).resolve(&loader).await;
        assert!(versions.is_empty());
        assert!(!DataLayout::new(tmp.path()).version_cache_path(&loader.cache_key()).exists());
    }
}
