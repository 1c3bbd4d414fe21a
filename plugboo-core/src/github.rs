use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GitHubAsset {
    pub name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub browser_download_url: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GitHubRelease {
    pub name: Option<String>,
    pub tag_name: Option<String>,
    pub published_at: Option<String>,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GitHubRateLimit {
    pub limit: i32,
    pub remaining: i32,
    pub reset_unix: i64,
}

/// Source of loader releases, in feed order.
#[async_trait]
pub trait ReleaseFeed: Send + Sync {
    async fn releases(&self, owner: &str, repo: &str) -> Result<Vec<GitHubRelease>>;
}

pub struct GitHubReleaseFeed {
    client: reqwest::Client,
    token: Option<String>,
    rate_limit: Mutex<GitHubRateLimit>,
}

impl GitHubReleaseFeed {
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.filter(|t| !t.trim().is_empty()),
            rate_limit: Mutex::new(GitHubRateLimit::default()),
        }
    }

    pub fn rate_limit(&self) -> GitHubRateLimit {
        *self.rate_limit.lock()
    }
}

fn header_num<T: std::str::FromStr + Default>(headers: &reqwest::header::HeaderMap, name: &str) -> Option<T> {
    headers.get(name).map(|v| v.to_str().unwrap_or("0").parse().unwrap_or_default())
}

#[async_trait]
impl ReleaseFeed for GitHubReleaseFeed {
    async fn releases(&self, owner: &str, repo: &str) -> Result<Vec<GitHubRelease>> {
        let url = format!("https://api.github.com/repos/{owner}/{repo}/releases");
        info!("GitHub fetch: {}", url);
        let mut req = self
            .client
            .get(&url)
            .header("User-Agent", "Plugboo-RS")
            .header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;

        {
            let headers = resp.headers();
            let mut rl = self.rate_limit.lock();
            if let Some(v) = header_num(headers, "X-RateLimit-Limit") { rl.limit = v; }
            if let Some(v) = header_num(headers, "X-RateLimit-Remaining") { rl.remaining = v; }
            if let Some(v) = header_num(headers, "X-RateLimit-Reset") { rl.reset_unix = v; }
        }

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            anyhow::bail!("GitHub API error: {}", status);
        }
        let releases: Vec<GitHubRelease> = serde_json::from_str(&text)?;
        Ok(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_release_payload_with_missing_optionals() {
        let text = r#"[{"tag_name":"v7.0","assets":[{"name":"a-play.zip","content_type":"application/zip","browser_download_url":"https://x/a"}]},{"name":"draft"}]"#;
        let releases: Vec<GitHubRelease> = serde_json::from_str(text).unwrap();
        assert_eq!(releases.len(), 2);
        assert_eq!(releases[0].assets[0].content_type.as_deref(), Some("application/zip"));
        assert!(releases[1].assets.is_empty());
        assert!(releases[1].tag_name.is_none());
    }
}
