use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

pub const LOADER_SECTION: &str = "Loader";
pub const TARGET_KEY: &str = "target";
pub const LAUNCH_KEY: &str = "launch";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Section(String),
    Entry { key: String, value: String },
    /// Blank lines, comments and bare directives, preserved as-is.
    Raw(String),
}

/// Line-preserving INI document. Unchanged lines are written back byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IniDocument {
    lines: Vec<Line>,
    originals: Vec<Option<String>>,
    newline: &'static str,
    trailing_newline: bool,
}

impl IniDocument {
    pub fn parse(text: &str) -> Result<Self> {
        let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines = Vec::new();
        let mut originals = Vec::new();
        for (no, raw) in text.lines().enumerate() {
            let raw = raw.strip_suffix('\r').unwrap_or(raw);
            let t = raw.trim();
            let line = if t.is_empty() || t.starts_with(';') || t.starts_with('#') {
                Line::Raw(raw.to_string())
            } else if t.starts_with('[') {
                let Some(end) = t.find(']') else { bail!("line {}: unterminated section header", no + 1) };
                let name = t[1..end].trim();
                if name.is_empty() {
                    bail!("line {}: empty section name", no + 1);
                }
                Line::Section(name.to_string())
            } else if let Some((k, v)) = t.split_once('=') {
                let key = k.trim();
                if key.is_empty() {
                    bail!("line {}: entry without a key", no + 1);
                }
                Line::Entry { key: key.to_string(), value: v.trim().to_string() }
            } else {
                Line::Raw(raw.to_string())
            };
            lines.push(line);
            originals.push(Some(raw.to_string()));
        }
        Ok(Self { lines, originals, newline, trailing_newline: text.ends_with('\n') || text.is_empty() })
    }

    fn section_bounds(&self, section: &str) -> Option<(usize, usize)> {
        let start = self
            .lines
            .iter()
            .position(|l| matches!(l, Line::Section(s) if s.eq_ignore_ascii_case(section)))?;
        let end = self.lines[start + 1..]
            .iter()
            .position(|l| matches!(l, Line::Section(_)))
            .map(|p| start + 1 + p)
            .unwrap_or(self.lines.len());
        Some((start, end))
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.section_bounds(section).is_some()
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let (start, end) = self.section_bounds(section)?;
        self.lines[start + 1..end].iter().find_map(|l| match l {
            Line::Entry { key: k, value } if k.eq_ignore_ascii_case(key) => Some(value.as_str()),
            _ => None,
        })
    }

    /// Replaces the first `key` in `section`, or appends it after the section's last entry.
    /// Returns false when the section does not exist.
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> bool {
        let Some((start, end)) = self.section_bounds(section) else { return false };
        let new_line = Line::Entry { key: key.to_string(), value: value.to_string() };
        let existing = (start + 1..end).find(|&i| matches!(&self.lines[i], Line::Entry { key: k, .. } if k.eq_ignore_ascii_case(key)));
        match existing {
            Some(i) => {
                self.lines[i] = new_line;
                self.originals[i] = None;
            }
            None => {
                let insert_at = (start + 1..end)
                    .rev()
                    .find(|&i| matches!(self.lines[i], Line::Entry { .. }))
                    .map(|i| i + 1)
                    .unwrap_or(start + 1);
                self.lines.insert(insert_at, new_line);
                self.originals.insert(insert_at, None);
            }
        }
        true
    }

    pub fn render(&self) -> String {
        let rendered: Vec<String> = self
            .lines
            .iter()
            .zip(&self.originals)
            .map(|(line, original)| match (original, line) {
                (Some(raw), _) => raw.clone(),
                (None, Line::Entry { key, value }) => format!("{key} = {value}"),
                (None, Line::Section(name)) => format!("[{name}]"),
                (None, Line::Raw(raw)) => raw.clone(),
            })
            .collect();
        let mut out = rendered.join(self.newline);
        if self.trailing_newline && !out.is_empty() {
            out.push_str(self.newline);
        }
        out
    }
}

/// Points the loader at the game: resolves `[Loader] target` against `game_install_path`
/// and stores the absolute result as `[Loader] launch`.
///
/// Returns false (after logging) when the file is unreadable, unparsable or lacks the
/// target entry; the file is left untouched in those cases.
pub fn patch_loader_config(ini_path: &Path, game_install_path: &Path) -> bool {
    let text = match fs::read_to_string(ini_path) {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to read loader config {}: {}", ini_path.display(), e);
            return false;
        }
    };
    let mut doc = match IniDocument::parse(&text) {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to parse loader config {}: {:#}", ini_path.display(), e);
            return false;
        }
    };
    let Some(target) = doc.get(LOADER_SECTION, TARGET_KEY).map(str::to_string) else {
        warn!("Loader config {} has no [{}] {} entry", ini_path.display(), LOADER_SECTION, TARGET_KEY);
        return false;
    };

    let launch = game_install_path.join(target.trim_matches('"'));
    doc.set(LOADER_SECTION, LAUNCH_KEY, &launch.display().to_string());
    match write_document(ini_path, &doc) {
        Ok(()) => {
            info!("Patched {} to launch {}", ini_path.display(), launch.display());
            true
        }
        Err(e) => {
            error!("Failed to write loader config {}: {:#}", ini_path.display(), e);
            false
        }
    }
}

fn write_document(path: &Path, doc: &IniDocument) -> Result<()> {
    fs::write(path, doc.render()).with_context(|| format!("write {}", path.display()))
}
