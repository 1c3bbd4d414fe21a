pub mod app;
pub mod archive;
pub mod catalog;
pub mod elevation;
pub mod error;
pub mod events;
pub mod games;
pub mod github;
pub mod http;
pub mod ini;
pub mod jobs;
pub mod launch;
pub mod loader;
pub mod loader_install;
pub mod logging;
pub mod mod_install;
pub mod mods;
pub mod paths;
pub mod profile;
pub mod profiles;
pub mod resolver;
pub mod settings;
pub mod version_cache;

pub use app::{LoaderListing, Plugboo, Services};
pub use archive::{extract_archive, is_readable_archive, ExtractReport, ExtractRules};
pub use catalog::{ContentCatalog, GameBananaCatalog, Package, PackageFile, PackageMedia};
pub use elevation::{is_elevated, LaunchPlan};
pub use error::{CoreError, CoreResult};
pub use events::{CoreEvent, EventBus, OutputStream};
pub use games::{Game, GameInfo, GameLibrary, GameRegistry};
pub use github::{GitHubAsset, GitHubRateLimit, GitHubRelease, GitHubReleaseFeed, ReleaseFeed};
pub use http::{Downloader, HttpDownloader, ProgressFn};
pub use ini::{patch_loader_config, IniDocument};
pub use jobs::{JobHandle, JobRegistry};
pub use launch::ProcessLauncher;
pub use loader::{LoaderDescriptor, LoaderFile, LoaderInstance, LoaderVersion};
pub use loader_install::LoaderInstaller;
pub use logging::{init_logging, ProgressThrottle};
pub use mod_install::ModInstaller;
pub use mods::Mod;
pub use paths::DataLayout;
pub use profile::{LoaderStatus, Profile};
pub use profiles::ProfileStore;
pub use resolver::{classify_releases, LoaderVersionResolver};
pub use settings::{AppSettings, SettingsStore};
pub use version_cache::VersionCache;
