use crate::logging::ProgressThrottle;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use humansize::{format_size, DECIMAL};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Progress sink receiving a 0..=100 percentage.
pub type ProgressFn = dyn Fn(u8) + Send + Sync;

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetches `url` into `dest`. Nothing appears at `dest` unless the whole body arrived.
    async fn download(&self, url: &str, dest: &Path, progress: &ProgressFn) -> Result<u64>;
}

/// Sibling path a download is streamed into before being renamed over `dest`. Unique per
/// call so two writers never share a partial file.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.part", uuid::Uuid::new_v4().simple()));
    dest.with_file_name(name)
}

pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `bytes` into `part`, checking the length against `total` when the server sent one.
async fn stream_body<S, B, E>(bytes: S, total: u64, part: &Path, url: &str, progress: &ProgressFn) -> Result<u64>
where
    S: futures_util::Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    futures_util::pin_mut!(bytes);
    let mut file = fs::File::create(part).await.with_context(|| format!("create {}", part.display()))?;
    let mut throttle = ProgressThrottle::new(150);
    let mut downloaded: u64 = 0;
    while let Some(chunk) = bytes.next().await {
        let chunk = chunk.with_context(|| format!("read body of {url}"))?;
        let chunk = chunk.as_ref();
        file.write_all(chunk).await.with_context(|| format!("write {}", part.display()))?;
        downloaded += chunk.len() as u64;
        if total > 0 {
            let pct = ((downloaded as f64 / total as f64) * 100.0) as u8;
            throttle.emit(url, pct.min(99), |p| progress(p));
        }
    }
    file.flush().await?;
    if total > 0 && downloaded != total {
        anyhow::bail!("incomplete body: {} of {} bytes", downloaded, total);
    }
    Ok(downloaded)
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path, progress: &ProgressFn) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await.with_context(|| format!("create {}", parent.display()))?;
        }
        let part = partial_path(dest);

        info!("Downloading {} -> {}", url, dest.display());
        let resp = self
            .client
            .get(url)
            .header("User-Agent", "Plugboo-RS")
            .send()
            .await?
            .error_for_status()?;
        let total = resp.content_length().unwrap_or(0);
        let streamed = stream_body(resp.bytes_stream(), total, &part, url, progress).await;
        let downloaded = match streamed {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&part).await;
                return Err(e);
            }
        };
        fs::rename(&part, dest).await.with_context(|| format!("move {} into place", part.display()))?;
        progress(100);
        debug!("Downloaded {} ({})", dest.display(), format_size(downloaded, DECIMAL));
        Ok(downloaded)
    }
}
