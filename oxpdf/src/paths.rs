//! Search-path handling for PDF set discovery.
//!
//! The path list is seeded from the colon-separated `OXPDF_DATA_PATH`
//! environment variable, with a compile-time install prefix appended as the
//! last-resort fallback. The list can be manipulated at runtime; the
//! earliest directory wins every lookup.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use once_cell::sync::Lazy;

/// Install-prefix fallback, overridable at build time.
const INSTALL_PREFIX: &str = match option_env!("OXPDF_DATA_PREFIX") {
    Some(prefix) => prefix,
    None => "/usr/local/share/oxpdf",
};

static SEARCH_PATHS: Lazy<RwLock<Vec<PathBuf>>> = Lazy::new(|| RwLock::new(initial_paths()));

fn initial_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = std::env::var("OXPDF_DATA_PATH")
        .map(|var| {
            var.split(':')
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default();
    paths.push(PathBuf::from(INSTALL_PREFIX));
    paths
}

/// The ordered list of search directories.
pub fn paths() -> Vec<PathBuf> {
    SEARCH_PATHS.read().unwrap().clone()
}

/// Replaces the search path list.
pub fn set_paths(paths: impl IntoIterator<Item = PathBuf>) {
    *SEARCH_PATHS.write().unwrap() = paths.into_iter().collect();
}

/// Inserts a directory at the front of the search path list.
pub fn prepend_path(path: impl Into<PathBuf>) {
    SEARCH_PATHS.write().unwrap().insert(0, path.into());
}

/// Appends a directory to the end of the search path list.
pub fn append_path(path: impl Into<PathBuf>) {
    SEARCH_PATHS.write().unwrap().push(path.into());
}

/// First search-path location at which `target` exists.
///
/// An absolute `target` is returned as-is when it exists.
pub fn find_file(target: impl AsRef<Path>) -> Option<PathBuf> {
    let target = target.as_ref();
    if target.as_os_str().is_empty() {
        return None;
    }
    if target.is_absolute() {
        return target.exists().then(|| target.to_path_buf());
    }
    paths()
        .iter()
        .map(|base| base.join(target))
        .find(|candidate| candidate.exists())
}

/// Set-relative path of a member data file: `<SET>/<SET>_NNNN.dat`.
pub fn pdf_mem_path(setname: &str, member: usize) -> PathBuf {
    PathBuf::from(setname).join(format!("{setname}_{member:04}.dat"))
}

/// Locates a member data file on the search path.
pub fn find_pdf_mem_path(setname: &str, member: usize) -> Option<PathBuf> {
    find_file(pdf_mem_path(setname, member))
}

/// Set-relative path of a set info file: `<SET>/<SET>.info`.
pub fn pdf_set_info_path(setname: &str) -> PathBuf {
    PathBuf::from(setname).join(format!("{setname}.info"))
}

/// Locates a set info file on the search path.
pub fn find_pdf_set_info_path(setname: &str) -> Option<PathBuf> {
    find_file(pdf_set_info_path(setname))
}

/// Names of all sets found in the search path, sorted and deduplicated.
///
/// A directory counts as a set when it contains its own `<name>.info` file.
/// The scan is repeated on every call since the path list is mutable at
/// runtime.
pub fn available_pdf_sets() -> Vec<String> {
    let mut sets = Vec::new();
    for base in paths() {
        let Ok(entries) = std::fs::read_dir(&base) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if path.join(format!("{name}.info")).exists() {
                sets.push(name.to_string());
            }
        }
    }
    sets.sort_unstable();
    sets.dedup();
    sets
}
