use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Per-entry rules applied while unpacking an archive.
#[derive(Debug, Clone, Default)]
pub struct ExtractRules {
    /// Top-level folder names that are stripped from entry paths when present.
    pub wrapper_folders: Vec<String>,
    /// Relative paths that are never written.
    pub skip_files: Vec<String>,
    /// Relative paths that are only written when nothing exists at the destination yet.
    pub keep_existing: Vec<String>,
}

impl ExtractRules {
    /// Unpack everything as-is.
    pub fn verbatim() -> Self {
        Self::default()
    }

    /// Loader layout: strip the wrapper folder, drop the readme, keep the user's edited config.
    pub fn loader(wrapper_folder: &str, config_file: &str) -> Self {
        Self {
            wrapper_folders: vec![wrapper_folder.to_string()],
            skip_files: vec!["README.txt".to_string()],
            keep_existing: vec![config_file.to_string()],
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractReport {
    pub files_written: usize,
    pub files_skipped: usize,
    pub files_kept: usize,
}

/// Relative destination for a raw entry name, or `None` when the entry maps onto the
/// destination root itself or would escape it.
fn relative_entry_path(raw: &str, rules: &ExtractRules) -> Option<String> {
    let mut name = raw.replace('\\', "/");
    while name.starts_with('/') {
        name.remove(0);
    }
    if let Some((first, rest)) = name.split_once('/') {
        if rules.wrapper_folders.iter().any(|w| w == first) {
            name = rest.to_string();
        }
    } else if rules.wrapper_folders.iter().any(|w| *w == name) {
        return None;
    }
    let name = name.trim_end_matches('/').to_string();
    if name.is_empty() {
        return None;
    }
    let escapes = Path::new(&name)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return None;
    }
    Some(name)
}

/// Unpacks `archive` into `dest`. Any write failure aborts the whole extraction.
pub fn extract_archive(archive: &Path, dest: &Path, rules: &ExtractRules) -> Result<ExtractReport> {
    let file = File::open(archive).with_context(|| format!("open archive {}", archive.display()))?;
    let mut zip = ZipArchive::new(file).with_context(|| format!("read archive {}", archive.display()))?;
    fs::create_dir_all(dest).with_context(|| format!("create {}", dest.display()))?;

    info!("Extracting {} into {}", archive.display(), dest.display());
    let mut report = ExtractReport::default();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).with_context(|| format!("read entry #{i} of {}", archive.display()))?;
        let raw_name = entry.name().to_string();
        let Some(rel) = relative_entry_path(&raw_name, rules) else {
            if !raw_name.trim_end_matches(['/', '\\']).is_empty() && !entry.is_dir() {
                warn!("Skipping unsafe archive entry {}", raw_name);
            }
            continue;
        };
        let outpath: PathBuf = dest.join(&rel);

        if entry.is_dir() {
            fs::create_dir_all(&outpath).with_context(|| format!("create {}", outpath.display()))?;
            continue;
        }
        if rules.skip_files.iter().any(|s| *s == rel) {
            debug!("Skipping {}", rel);
            report.files_skipped += 1;
            continue;
        }
        if rules.keep_existing.iter().any(|s| *s == rel) && outpath.exists() {
            debug!("Keeping existing {}", rel);
            report.files_kept += 1;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let mut outfile = File::create(&outpath).with_context(|| format!("create {}", outpath.display()))?;
        std::io::copy(&mut entry, &mut outfile).with_context(|| format!("write {}", outpath.display()))?;
        report.files_written += 1;
    }

    info!(
        "Extracted {} files ({} skipped, {} kept) into {}",
        report.files_written,
        report.files_skipped,
        report.files_kept,
        dest.display()
    );
    Ok(report)
}

/// True when `path` opens as a zip and its central directory is readable.
pub fn is_readable_archive(path: &Path) -> bool {
    File::open(path).ok().and_then(|f| ZipArchive::new(f).ok()).is_some()
}
