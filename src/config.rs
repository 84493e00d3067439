//! Build configuration
//!
//! Loaded from an optional TOML file, then overridden by CLI flags.
//!
//! ```toml
//! extension_order = ["ego_dlc_split", "ego_dlc_terran", "ego_dlc_boron"]
//! min_overlap = 3
//! excluded_macro_tokens = ["spacesuit", "story"]
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CatalogueError, Result};

/// Token that always removes a macro from the hull candidate pool.
pub const MASSTRAFFIC_TOKEN: &str = "masstraffic";

pub const DEFAULT_MIN_OVERLAP: usize = 3;

fn default_excluded_tokens() -> Vec<String> {
    [
        "spacesuit",
        "lasertower",
        "escapepod",
        "damagebody",
        "story",
        "plot",
        "scenario",
        "storage",
        "struct",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Declared extension precedence. Unlisted extensions follow in name order.
    pub extension_order: Vec<String>,
    /// Minimum shared tokens for an archetype/macro pair to count as a match.
    pub min_overlap: usize,
    /// Extra tokens marking non-hull macros; `masstraffic` is always implied.
    pub excluded_macro_tokens: Vec<String>,
    pub extensions_enabled: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            extension_order: Vec::new(),
            min_overlap: DEFAULT_MIN_OVERLAP,
            excluded_macro_tokens: default_excluded_tokens(),
            extensions_enabled: true,
        }
    }
}

impl BuildConfig {
    pub fn from_toml_str(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| CatalogueError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text).map_err(|e| CatalogueError::Config {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_overlap < 2 {
            return Err(CatalogueError::InvalidConfig(format!(
                "min_overlap must be at least 2 (got {}); a single shared token is incidental",
                self.min_overlap
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for ext in &self.extension_order {
            if !seen.insert(ext.as_str()) {
                return Err(CatalogueError::InvalidConfig(format!(
                    "extension '{ext}' listed twice in extension_order"
                )));
            }
        }
        Ok(())
    }

    /// Excluded tokens including the fixed masstraffic rule, lowercase.
    pub fn exclusion_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self
            .excluded_macro_tokens
            .iter()
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        tokens.push(MASSTRAFFIC_TOKEN.to_string());
        tokens.sort();
        tokens.dedup();
        tokens
    }
}
