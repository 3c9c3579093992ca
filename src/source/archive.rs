//! Archive bundles
//!
//! A named export inside the archive is extracted on its own (with any ECG
//! signal directory next to it). Without one, the whole archive is unpacked
//! and scanned like a directory.

use super::{CandidateGroup, Resolution, SourceKind, SourceResolver};
use crate::error::LensError;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

struct EntryInfo {
    index: usize,
    path: PathBuf,
    is_dir: bool,
}

pub(super) fn resolve_archive(
    resolver: &SourceResolver<'_>,
    path: &Path,
) -> Result<Resolution, LensError> {
    let config = resolver.config();
    let mut archive = ZipArchive::new(File::open(path)?)?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        match entry.enclosed_name() {
            Some(p) => entries.push(EntryInfo {
                index,
                path: p.to_path_buf(),
                is_dir: entry.is_dir(),
            }),
            None => tracing::warn!("skipping unsafe archive entry {:?}", entry.name()),
        }
    }

    let exports: Vec<PathBuf> = entries
        .iter()
        .filter(|e| !e.is_dir && is_export_name(&e.path, &config.export_file_names))
        .map(|e| e.path.clone())
        .collect();

    // Held locally until the resolution is returned so a failure removes it
    let mut builder = tempfile::Builder::new();
    builder.prefix("health-lens-");
    let scratch = match &config.scratch_dir {
        Some(dir) => builder.tempdir_in(dir)?,
        None => builder.tempdir()?,
    };

    if let Some(chosen) = resolver.choose_export(exports)? {
        tracing::debug!(
            "extracting {} from {}",
            chosen.display(),
            path.display()
        );
        for entry in &entries {
            let wanted = entry.path == chosen
                || in_directory(&entry.path, &config.ecg_directory_names);
            if wanted && !entry.is_dir {
                extract_entry(&mut archive, entry, scratch.path())?;
            }
        }
        return Ok(Resolution {
            groups: vec![CandidateGroup {
                kind: SourceKind::Markup,
                files: vec![scratch.path().join(&chosen)],
            }],
            bundle_root: scratch.path().to_path_buf(),
            scratch: vec![scratch],
        });
    }

    tracing::debug!(
        "no named export in {}, unpacking {} entries",
        path.display(),
        entries.len()
    );
    archive.extract(scratch.path())?;
    let groups = resolver.scan_directory(scratch.path())?;
    Ok(Resolution {
        groups,
        bundle_root: scratch.path().to_path_buf(),
        scratch: vec![scratch],
    })
}

fn is_export_name(path: &Path, names: &[String]) -> bool {
    path.file_name()
        .map(|f| f.to_string_lossy())
        .map(|f| names.iter().any(|n| *n == f))
        .unwrap_or(false)
}

fn in_directory(path: &Path, directory_names: &[String]) -> bool {
    path.parent()
        .map(|parent| {
            parent.components().any(|c| {
                let c = c.as_os_str().to_string_lossy();
                directory_names.iter().any(|n| *n == c)
            })
        })
        .unwrap_or(false)
}

fn extract_entry(
    archive: &mut ZipArchive<File>,
    entry: &EntryInfo,
    target: &Path,
) -> Result<(), LensError> {
    let out_path = target.join(&entry.path);
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut source = archive.by_index(entry.index)?;
    let mut out = File::create(&out_path)?;
    io::copy(&mut source, &mut out)?;
    Ok(())
}
