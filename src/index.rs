//! Token index over hull macros

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::BuildConfig;
use crate::models::MacroRecord;
use crate::tokens::{Token, TokenSet, tokenize};

/// A macro admitted to the candidate pool, with its tokens.
#[derive(Debug)]
pub struct IndexedMacro<'a> {
    pub record: &'a MacroRecord,
    pub tokens: TokenSet,
}

/// Maps every retained token to the macros carrying it.
///
/// Masstraffic macros and macros carrying a configured exclusion token are
/// dropped before indexing and can never become candidates.
#[derive(Debug)]
pub struct MacroIndex<'a> {
    macros: Vec<IndexedMacro<'a>>,
    by_token: BTreeMap<Token, BTreeSet<usize>>,
    excluded: usize,
}

impl<'a> MacroIndex<'a> {
    pub fn build(records: &'a [MacroRecord], config: &BuildConfig) -> Self {
        let exclusions = config.exclusion_tokens();
        let mut macros = Vec::new();
        let mut by_token: BTreeMap<Token, BTreeSet<usize>> = BTreeMap::new();
        let mut excluded = 0;

        for record in records {
            let tokens = tokenize(&record.macro_id);
            if record.masstraffic || exclusions.iter().any(|t| tokens.contains(t)) {
                excluded += 1;
                continue;
            }
            let idx = macros.len();
            for token in tokens.iter() {
                by_token.entry(token.clone()).or_default().insert(idx);
            }
            macros.push(IndexedMacro { record, tokens });
        }

        debug!(
            indexed = macros.len(),
            excluded,
            tokens = by_token.len(),
            "built macro index"
        );
        Self {
            macros,
            by_token,
            excluded,
        }
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    pub fn excluded(&self) -> usize {
        self.excluded
    }

    /// Macros sharing at least one token with `tokens`, in insertion order.
    pub fn candidates(&self, tokens: &TokenSet) -> Vec<&IndexedMacro<'a>> {
        let hits: BTreeSet<usize> = tokens
            .iter()
            .filter_map(|t| self.by_token.get(t))
            .flatten()
            .copied()
            .collect();
        hits.into_iter().map(|i| &self.macros[i]).collect()
    }

    /// Macro ids indexed under one token.
    pub fn lookup(&self, token: &str) -> Vec<&str> {
        self.by_token
            .get(token)
            .map(|ids| {
                ids.iter()
                    .map(|i| self.macros[*i].record.macro_id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}
