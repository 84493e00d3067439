//! Locates game data files for the base game and every extension
//!
//! Layout of an unpacked X4 installation:
//!
//! ```text
//! <root>/libraries/wares.xml
//! <root>/libraries/ships.xml
//! <root>/assets/units/size_l/macros/ship_arg_l_destroyer_01_a_macro.xml
//! <root>/assets/units/size_l/ship_arg_l_destroyer_01.xml
//! <root>/extensions/<ext>/libraries/...
//! <root>/extensions/<ext>/assets/units/...
//! ```

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::BuildConfig;
use crate::error::{CatalogueError, Result};
use crate::models::Provenance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Wares,
    Ships,
    /// Anything under `assets/units/size_*`: macro or component files.
    Units,
}

/// One dataset (base or an extension) and the directory it lives in.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub provenance: Provenance,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub kind: DocumentKind,
    pub provenance: Provenance,
}

/// Use `<root>/_unpacked` when the catalogue tools extracted there.
pub fn effective_root(root: &Path) -> PathBuf {
    let unpacked = root.join("_unpacked");
    if unpacked.is_dir() {
        unpacked
    } else {
        root.to_path_buf()
    }
}

fn extension_names(ext_root: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in WalkDir::new(ext_root).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| CatalogueError::Io {
            path: ext_root.to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Base first, then extensions in declared order, then the rest by name.
pub fn resolve_datasets(root: &Path, config: &BuildConfig) -> Result<Vec<Dataset>> {
    let root = effective_root(root);
    if !root.is_dir() {
        return Err(CatalogueError::Io {
            path: root.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "game root not found"),
        });
    }

    let mut datasets = vec![Dataset {
        provenance: Provenance::base(),
        dir: root.clone(),
    }];

    let ext_root = root.join("extensions");
    if !config.extensions_enabled || !ext_root.is_dir() {
        return Ok(datasets);
    }

    let mut remaining = extension_names(&ext_root)?;
    let mut ordered = Vec::new();
    for name in &config.extension_order {
        if let Some(pos) = remaining.iter().position(|n| n == name) {
            ordered.push(remaining.remove(pos));
        } else {
            warn!(extension = %name, "extension listed in extension_order is not installed");
        }
    }
    ordered.extend(remaining);

    for (i, name) in ordered.into_iter().enumerate() {
        datasets.push(Dataset {
            dir: ext_root.join(&name),
            provenance: Provenance::extension(name, i + 1),
        });
    }
    Ok(datasets)
}

fn unit_files(dataset: &Dataset) -> Vec<PathBuf> {
    let units = dataset.dir.join("assets").join("units");
    if !units.is_dir() {
        return Vec::new();
    }

    WalkDir::new(&units)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("xml")))
        .filter(|p| {
            p.strip_prefix(&units)
                .ok()
                .and_then(|rel| rel.components().next())
                .and_then(|c| c.as_os_str().to_str())
                .is_some_and(|first| first.starts_with("size_"))
        })
        .collect()
}

/// Every source file in load order.
pub fn find_source_files(root: &Path, config: &BuildConfig) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();

    for dataset in resolve_datasets(root, config)? {
        let libraries = dataset.dir.join("libraries");
        for (name, kind) in [
            ("wares.xml", DocumentKind::Wares),
            ("ships.xml", DocumentKind::Ships),
        ] {
            let path = libraries.join(name);
            if path.is_file() {
                files.push(SourceFile {
                    path,
                    kind,
                    provenance: dataset.provenance.clone(),
                });
            }
        }

        let units = unit_files(&dataset);
        debug!(
            provenance = %dataset.provenance,
            unit_files = units.len(),
            "scanned dataset"
        );
        files.extend(units.into_iter().map(|path| SourceFile {
            path,
            kind: DocumentKind::Units,
            provenance: dataset.provenance.clone(),
        }));
    }

    Ok(files)
}
