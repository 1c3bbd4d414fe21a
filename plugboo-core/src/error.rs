use std::path::PathBuf;
use thiserror::Error;

/// Structured failure returned by every request/response operation of the core.
/// `reason()` yields the stable code the front-end switches on.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("game not found: {0}")]
    GameNotFound(String),

    #[error("game '{0}' has no install path set")]
    GameNotInitialized(String),

    #[error("game '{0}' already has an install path")]
    GameAlreadyInitialized(String),

    #[error("path is not a valid install folder: {0:?}")]
    InvalidPath(PathBuf),

    #[error("loader not found: {0}")]
    LoaderNotFound(String),

    #[error("loader version not found: {0}")]
    VersionNotFound(String),

    #[error("profile name cannot be empty")]
    NameCannotBeEmpty,

    #[error("profile name cannot be used as a folder name: {0}")]
    InvalidName(String),

    #[error("a profile already exists at {0:?}")]
    ProfileExists(PathBuf),

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("loader executable missing: {0:?}")]
    LoaderNotInstalled(PathBuf),

    #[error("package not found: {0}")]
    PackageNotFound(String),

    #[error("an install is already running for {0}")]
    InstallInProgress(String),

    #[error("download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("background task failed: {0}")]
    TaskFailed(String),

    #[error("IO error at {path:?}: {message}")]
    Io { path: PathBuf, message: String },
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn reason(&self) -> &'static str {
        match self {
            CoreError::GameNotFound(_) => "GAME_NOT_FOUND",
            CoreError::GameNotInitialized(_) => "GAME_NOT_INITIALIZED",
            CoreError::GameAlreadyInitialized(_) => "GAME_ALREADY_INITIALIZED",
            CoreError::InvalidPath(_) => "INVALID_PATH",
            CoreError::LoaderNotFound(_) => "LOADER_NOT_FOUND",
            CoreError::VersionNotFound(_) => "VERSION_NOT_FOUND",
            CoreError::NameCannotBeEmpty => "NAME_CANNOT_BE_EMPTY",
            CoreError::InvalidName(_) => "INVALID_NAME",
            CoreError::ProfileExists(_) => "PROFILE_EXISTS",
            CoreError::ProfileNotFound(_) => "PROFILE_NOT_FOUND",
            CoreError::LoaderNotInstalled(_) => "LOADER_NOT_INSTALLED",
            CoreError::PackageNotFound(_) => "PACKAGE_NOT_FOUND",
            CoreError::InstallInProgress(_) => "INSTALL_IN_PROGRESS",
            CoreError::DownloadFailed { .. } => "DOWNLOAD_FAILED",
            CoreError::ChecksumMismatch { .. } => "CHECKSUM_MISMATCH",
            CoreError::ExtractionFailed(_) => "EXTRACTION_FAILED",
            CoreError::TaskFailed(_) => "TASK_FAILED",
            CoreError::Io { .. } => "IO_ERROR",
        }
    }

    pub fn io(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        CoreError::Io { path: path.into(), message: err.to_string() }
    }
}

// Front-ends receive `{ reason, message }` rather than the Rust representation.
impl serde::Serialize for CoreError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("CoreError", 2)?;
        s.serialize_field("reason", self.reason())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}
