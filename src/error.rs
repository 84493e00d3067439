//! Fatal error taxonomy for a catalogue build

use std::path::PathBuf;

/// Errors that abort a build.
///
/// Per-record problems (a ware without an id, an archetype with no hull
/// match) are not errors; they are collected in
/// [`Diagnostics`](crate::diagnostics::Diagnostics) and the match report.
#[derive(Debug, thiserror::Error)]
pub enum CatalogueError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed XML in {path}: {detail}")]
    Xml { path: PathBuf, detail: String },

    #[error("invalid config file {path}: {detail}")]
    Config { path: PathBuf, detail: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The same method name was defined twice for one ware.
    #[error(
        "merge conflict: ware '{ware_id}' defines production method '{method}' in both {first} and {second}"
    )]
    MergeConflict {
        ware_id: String,
        method: String,
        first: String,
        second: String,
    },

    #[error(
        "transport mismatch: ware '{ware_id}' is '{expected}' in {expected_in} but '{found}' in {found_in}"
    )]
    TransportMismatch {
        ware_id: String,
        expected: String,
        expected_in: String,
        found: String,
        found_in: String,
    },

    #[error(
        "invalid resource quantity {value} for '{ware_id}:{method}:{resource}' ({provenance}); quantities must be positive integers"
    )]
    InvalidQuantity {
        ware_id: String,
        method: String,
        resource: String,
        value: f64,
        provenance: String,
    },

    #[error("ware '{ware_id}' is defined more than once in {provenance}")]
    DuplicateWare { ware_id: String, provenance: String },

    #[error(transparent)]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CatalogueError>;
