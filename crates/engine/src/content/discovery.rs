use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::AppPaths;

use super::types::{ContentRequest, DiscoveryError};

pub(crate) const BASE_MOD_ID: &str = "base";

#[derive(Debug, Clone)]
pub(crate) struct ContentSource {
    pub mod_id: String,
    pub source_dir: PathBuf,
}

/// Base first, then enabled mods in request order.
pub(crate) fn discover_content_sources(
    app_paths: &AppPaths,
    request: &ContentRequest,
) -> Result<Vec<ContentSource>, DiscoveryError> {
    if !app_paths.base_content_dir.is_dir() {
        return Err(DiscoveryError::BaseMissing {
            expected_dir: app_paths.base_content_dir.clone(),
        });
    }

    let mut seen = HashSet::<String>::new();
    let mut sources = vec![ContentSource {
        mod_id: BASE_MOD_ID.to_string(),
        source_dir: app_paths.base_content_dir.clone(),
    }];

    for mod_id in &request.enabled_mods {
        let trimmed = mod_id.trim();
        if trimmed.is_empty() {
            return Err(DiscoveryError::EmptyEnabledMod);
        }
        if !seen.insert(trimmed.to_string()) {
            return Err(DiscoveryError::DuplicateEnabledMod {
                mod_id: trimmed.to_string(),
            });
        }
        let mod_dir = app_paths.mods_dir.join(trimmed);
        if !mod_dir.is_dir() {
            return Err(DiscoveryError::EnabledModMissing {
                mod_id: trimmed.to_string(),
                expected_dir: mod_dir,
            });
        }
        sources.push(ContentSource {
            mod_id: trimmed.to_string(),
            source_dir: mod_dir,
        });
    }

    Ok(sources)
}

#[derive(Debug)]
pub(crate) struct ReadDirError {
    pub path: PathBuf,
    pub source: io::Error,
}

/// Every `*.xml` file under `root`, ordered by normalized relative path.
pub(crate) fn collect_xml_files_sorted(root: &Path) -> Result<Vec<PathBuf>, ReadDirError> {
    let mut files = Vec::<(String, PathBuf)>::new();
    collect_recursive(root, root, &mut files)?;
    files.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

fn collect_recursive(
    root: &Path,
    current: &Path,
    files: &mut Vec<(String, PathBuf)>,
) -> Result<(), ReadDirError> {
    let entries = fs::read_dir(current).map_err(|source| ReadDirError {
        path: current.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ReadDirError {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(root, &path, files)?;
        } else if is_xml_file(&path) {
            let rel = path.strip_prefix(root).unwrap_or(&path);
            files.push((normalize_rel_path(rel), path.clone()));
        }
    }
    Ok(())
}

fn is_xml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}
