//! X4 Catalogue
//!
//! Builds one canonical, conflict-checked production catalogue from the
//! X4: Foundations base game and its extensions, and joins ship archetypes
//! to the hull macros that describe them.

pub mod assemble;
pub mod config;
pub mod diagnostics;
pub mod discover;
pub mod error;
pub mod extract;
pub mod index;
pub mod matcher;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod tokens;
pub mod xml;

pub use config::BuildConfig;
pub use error::{CatalogueError, Result};
pub use merge::Catalogue;
pub use pipeline::{Build, build, build_catalogue};
