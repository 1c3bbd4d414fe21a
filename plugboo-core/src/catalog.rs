use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageFile {
    pub name: String,
    pub url: String,
    pub size: Option<u64>,
    /// Hex MD5 of the file, when the catalog publishes one.
    pub md5: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageMedia {
    pub url: String,
    pub thumbnail_url: Option<String>,
}

impl PackageMedia {
    pub fn icon_url(&self) -> &str {
        self.thumbnail_url.as_deref().unwrap_or(&self.url)
    }
}

/// Content package as described by the remote catalog. Ids are opaque strings even when
/// the catalog uses numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    pub id: String,
    pub name: String,
    pub author: String,
    pub version: String,
    pub files: Vec<PackageFile>,
    pub media: Vec<PackageMedia>,
}

#[async_trait]
pub trait ContentCatalog: Send + Sync {
    /// `Ok(None)` when the catalog has no such package for this game.
    async fn get_package(&self, id: &str) -> Result<Option<Package>>;
    async fn search_packages(&self, query: &str, page: u32) -> Result<Vec<Package>>;
}

const GAMEBANANA_API: &str = "https://gamebanana.com/apiv11";

#[derive(Debug, Deserialize)]
struct GbImage {
    #[serde(rename = "_sBaseUrl")]
    base_url: String,
    #[serde(rename = "_sFile")]
    file: String,
    #[serde(rename = "_sFile220", default)]
    file_220: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GbPreviewMedia {
    #[serde(rename = "_aImages", default)]
    images: Vec<GbImage>,
}

#[derive(Debug, Deserialize)]
struct GbSubmitter {
    #[serde(rename = "_sName")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct GbFile {
    #[serde(rename = "_sFile")]
    file: String,
    #[serde(rename = "_sDownloadUrl")]
    download_url: String,
    #[serde(rename = "_nFilesize", default)]
    size: Option<u64>,
    #[serde(rename = "_sMd5Checksum", default)]
    md5: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GbGame {
    #[serde(rename = "_idRow")]
    id: u64,
}

#[derive(Debug, Deserialize)]
struct GbRecord {
    #[serde(rename = "_idRow")]
    id: u64,
    #[serde(rename = "_sName")]
    name: String,
    #[serde(rename = "_sVersion", default)]
    version: Option<String>,
    #[serde(rename = "_aSubmitter")]
    submitter: GbSubmitter,
    #[serde(rename = "_aPreviewMedia", default)]
    preview: GbPreviewMedia,
    #[serde(rename = "_aFiles", default)]
    files: Vec<GbFile>,
    #[serde(rename = "_aGame", default)]
    game: Option<GbGame>,
}

#[derive(Debug, Deserialize)]
struct GbSubfeed {
    #[serde(rename = "_aRecords", default)]
    records: Vec<GbRecord>,
}

impl From<GbRecord> for Package {
    fn from(r: GbRecord) -> Self {
        Package {
            id: r.id.to_string(),
            name: r.name,
            author: r.submitter.name,
            version: r.version.filter(|v| !v.is_empty()).unwrap_or_else(|| "N/A".to_string()),
            files: r
                .files
                .into_iter()
                .map(|f| PackageFile { name: f.file, url: f.download_url, size: f.size, md5: f.md5.filter(|m| !m.is_empty()) })
                .collect(),
            media: r
                .preview
                .images
                .into_iter()
                .map(|i| PackageMedia {
                    url: format!("{}/{}", i.base_url, i.file),
                    thumbnail_url: i.file_220.map(|t| format!("{}/{}", i.base_url, t)),
                })
                .collect(),
        }
    }
}

/// GameBanana client scoped to one game.
pub struct GameBananaCatalog {
    client: reqwest::Client,
    game_id: u64,
}

impl GameBananaCatalog {
    pub fn new(game_id: u64) -> Self {
        Self { client: reqwest::Client::new(), game_id }
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.get(url).header("User-Agent", "Plugboo-RS")
    }

    fn package_request(&self, id: &str) -> reqwest::Result<reqwest::Request> {
        self.request(&format!("{GAMEBANANA_API}/Mod/{id}/ProfilePage")).build()
    }

    /// Subfeed page of this game's mods; the name filter is only sent when non-empty.
    fn search_request(&self, query: &str, page: u32) -> reqwest::Result<reqwest::Request> {
        let mut builder = self
            .request(&format!("{GAMEBANANA_API}/Game/{}/Subfeed", self.game_id))
            .query(&[("_csvModelInclusions", "Mod")])
            .query(&[("_nPage", page.max(1))]);
        if !query.is_empty() {
            builder = builder.query(&[("_sName", query)]);
        }
        builder.build()
    }

    async fn get_json(&self, request: reqwest::Request) -> Result<Option<serde_json::Value>> {
        debug!("GameBanana fetch: {}", request.url());
        let resp = self.client.execute(request).await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let value: serde_json::Value = resp.json().await?;
        if value.get("_sErrorCode").is_some() {
            return Ok(None);
        }
        Ok(Some(value))
    }
}

#[async_trait]
impl ContentCatalog for GameBananaCatalog {
    async fn get_package(&self, id: &str) -> Result<Option<Package>> {
        // Ids are numeric; anything else would be spliced into the request path.
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            debug!("Ignoring non-numeric package id {:?}", id);
            return Ok(None);
        }
        let Some(value) = self.get_json(self.package_request(id)?).await? else { return Ok(None) };
        let record: GbRecord = serde_json::from_value(value)?;
        // Packages of other games are treated as absent.
        if record.game.as_ref().map(|g| g.id) != Some(self.game_id) {
            info!("Package {} does not belong to game {}", id, self.game_id);
            return Ok(None);
        }
        Ok(Some(record.into()))
    }

    async fn search_packages(&self, query: &str, page: u32) -> Result<Vec<Package>> {
        let query = query.trim();
        if !query.is_empty() && query.chars().all(|c| c.is_ascii_digit()) {
            return Ok(self.get_package(query).await?.into_iter().collect());
        }
        let Some(value) = self.get_json(self.search_request(query, page)?).await? else { return Ok(Vec::new()) };
        let feed: GbSubfeed = serde_json::from_value(value)?;
        Ok(feed.records.into_iter().map(Package::from).collect())
    }
}
