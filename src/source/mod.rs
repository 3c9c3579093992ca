//! Source resolution
//!
//! Turns a user-supplied path (file, directory or archive) into ordered
//! groups of candidate files for the ingestors.

mod archive;

use crate::config::{MultipleExportPolicy, SourceConfig};
use crate::error::LensError;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Kind of ingestible file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Streamed structured markup (`export.xml`)
    Markup,
    /// Top-level JSON array of objects
    ObjectArray,
    /// Delimited table with a health header
    Tabular,
}

/// Files of one kind, tried together
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateGroup {
    pub kind: SourceKind,
    pub files: Vec<PathBuf>,
}

/// Outcome of resolving one input path
#[derive(Debug)]
pub struct Resolution {
    /// Candidate groups in priority order
    pub groups: Vec<CandidateGroup>,
    /// Directory searched for ECG signal files
    pub bundle_root: PathBuf,
    /// Extraction directories; removed when dropped
    pub scratch: Vec<TempDir>,
}

/// Locates ingestible export files
pub struct SourceResolver<'a> {
    config: &'a SourceConfig,
}

impl<'a> SourceResolver<'a> {
    pub fn new(config: &'a SourceConfig) -> Self {
        Self { config }
    }

    pub fn resolve(&self, path: &Path) -> Result<Resolution, LensError> {
        if !path.exists() {
            return Err(LensError::SourceNotFound(path.to_path_buf()));
        }

        if path.is_dir() {
            let groups = self.scan_directory(path)?;
            return Ok(Resolution {
                groups,
                bundle_root: path.to_path_buf(),
                scratch: Vec::new(),
            });
        }

        if is_archive(path)? {
            return archive::resolve_archive(self, path);
        }

        let kind = match extension_of(path).as_deref() {
            Some("xml") => SourceKind::Markup,
            Some("json") => SourceKind::ObjectArray,
            Some("csv") => SourceKind::Tabular,
            _ => return Err(LensError::SourceNotFound(path.to_path_buf())),
        };
        Ok(Resolution {
            groups: vec![CandidateGroup {
                kind,
                files: vec![path.to_path_buf()],
            }],
            bundle_root: path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
            scratch: Vec::new(),
        })
    }

    /// Scan a directory tree: named exports first, then object-array files,
    /// then tabular files
    fn scan_directory(&self, root: &Path) -> Result<Vec<CandidateGroup>, LensError> {
        let mut markup = Vec::new();
        let mut object_arrays = Vec::new();
        let mut tabular = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let name = entry.file_name().to_string_lossy();

            if self.config.export_file_names.iter().any(|n| *n == name) {
                markup.push(path.to_path_buf());
                continue;
            }
            match extension_of(path).as_deref() {
                Some("json") => object_arrays.push(path.to_path_buf()),
                Some("csv") if !self.in_ecg_directory(root, path) => {
                    tabular.push(path.to_path_buf())
                }
                _ => {}
            }
        }

        tracing::debug!(
            "scanned {}: {} export, {} object-array, {} tabular candidates",
            root.display(),
            markup.len(),
            object_arrays.len(),
            tabular.len()
        );

        let mut groups = Vec::new();
        if let Some(chosen) = self.choose_export(markup)? {
            groups.push(CandidateGroup {
                kind: SourceKind::Markup,
                files: vec![chosen],
            });
        }
        if !object_arrays.is_empty() {
            groups.push(CandidateGroup {
                kind: SourceKind::ObjectArray,
                files: object_arrays,
            });
        }
        if !tabular.is_empty() {
            groups.push(CandidateGroup {
                kind: SourceKind::Tabular,
                files: tabular,
            });
        }

        if groups.is_empty() {
            return Err(LensError::SourceNotFound(root.to_path_buf()));
        }
        Ok(groups)
    }

    /// Apply the multiple-export policy; shallowest path wins, then
    /// lexicographic order
    fn choose_export(&self, mut matches: Vec<PathBuf>) -> Result<Option<PathBuf>, LensError> {
        matches.sort_by(|a, b| {
            a.components()
                .count()
                .cmp(&b.components().count())
                .then_with(|| a.cmp(b))
        });

        if matches.len() > 1 {
            match self.config.multiple_exports {
                MultipleExportPolicy::Reject => return Err(LensError::AmbiguousSource(matches)),
                MultipleExportPolicy::First => {
                    tracing::warn!(
                        "{} export files found, using {} and ignoring {:?}",
                        matches.len(),
                        matches[0].display(),
                        &matches[1..]
                    );
                }
            }
        }
        Ok(matches.into_iter().next())
    }

    fn in_ecg_directory(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        relative.components().any(|c| {
            let c = c.as_os_str().to_string_lossy();
            self.config.ecg_directory_names.iter().any(|n| *n == c)
        })
    }

    pub(crate) fn config(&self) -> &SourceConfig {
        self.config
    }
}

/// Directories named by `ecg_directory_names` anywhere under `root`
pub fn find_ecg_directories(root: &Path, config: &SourceConfig) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Error accessing entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            config.ecg_directory_names.iter().any(|n| *n == name)
        })
        .map(|entry| entry.into_path())
        .collect()
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    let name = name.to_string_lossy();
    name.starts_with('.') || name == "__MACOSX"
}

/// Zip archives are recognized by extension or by their magic bytes
fn is_archive(path: &Path) -> Result<bool, LensError> {
    if extension_of(path).as_deref() == Some("zip") {
        return Ok(true);
    }
    let mut magic = [0u8; 4];
    let mut file = File::open(path)?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == b"PK\x03\x04" || &magic == b"PK\x05\x06"),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}
