//! Archetype to hull macro matching
//!
//! Archetypes in `ships.xml` never name their hull macro. The join is
//! inferred from shared identifier tokens:
//!
//! 1. tokenize the archetype id and group
//! 2. gather candidates from the [`MacroIndex`]
//! 3. drop every candidate whose size class differs (hard gate)
//! 4. score by token overlap, rejecting scores under `min_overlap`
//! 5. break ties by faction race code, then same dataset, then lowest macro id
//!
//! A tie that survives all three rules is reported, never guessed.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{BuildConfig, MASSTRAFFIC_TOKEN};
use crate::diagnostics::{Diagnostics, IssueKind};
use crate::index::{IndexedMacro, MacroIndex};
use crate::models::{ArchetypeRecord, MacroRecord};
use crate::tokens::{TokenSet, race_code, tokenize_all};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    NoCandidates,
    AmbiguousTie,
}

impl MatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchReason::NoCandidates => "no_candidates",
            MatchReason::AmbiguousTie => "ambiguous_tie",
        }
    }
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An archetype left without a hull.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchIssue {
    pub archetype_id: String,
    pub provenance: String,
    pub reason: MatchReason,
    /// Tied macro ids for ambiguous joins; empty otherwise.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tied: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchReport {
    pub matched: usize,
    pub issues: Vec<MatchIssue>,
}

impl MatchReport {
    pub fn count(&self, reason: MatchReason) -> usize {
        self.issues.iter().filter(|i| i.reason == reason).count()
    }
}

impl fmt::Display for MatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Matched {} archetypes; {} without a hull ({} no_candidates, {} ambiguous_tie)",
            self.matched,
            self.issues.len(),
            self.count(MatchReason::NoCandidates),
            self.count(MatchReason::AmbiguousTie)
        )?;
        for issue in &self.issues {
            write!(f, "  [{}] {}: {}", issue.provenance, issue.archetype_id, issue.reason)?;
            if !issue.tied.is_empty() {
                write!(f, " ({})", issue.tied.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// A resolved archetype/macro pair.
#[derive(Debug, Clone, PartialEq)]
pub struct HullMatch {
    pub archetype: ArchetypeRecord,
    pub hull: MacroRecord,
    pub score: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    /// Every considered archetype, `None` when unjoined.
    pub matches: BTreeMap<String, Option<String>>,
    pub hulls: Vec<HullMatch>,
    pub report: MatchReport,
}

/// Ranking key; smaller is better.
type RankKey<'m> = (Reverse<usize>, bool, bool, &'m str);

fn archetype_tokens(archetype: &ArchetypeRecord) -> TokenSet {
    let mut idents = vec![archetype.archetype_id.as_str()];
    if let Some(group) = &archetype.group {
        idents.push(group);
    }
    tokenize_all(idents)
}

fn rank_key<'m>(
    archetype: &ArchetypeRecord,
    faction_codes: &[&str],
    candidate: &'m IndexedMacro<'_>,
    score: usize,
) -> RankKey<'m> {
    let faction_match = candidate.tokens.races().any(|r| faction_codes.contains(&r));
    let same_origin = candidate.record.provenance.origin == archetype.provenance.origin;
    (
        Reverse(score),
        !faction_match,
        !same_origin,
        candidate.record.macro_id.as_str(),
    )
}

/// Best macro for one archetype, or the reason there is none.
pub fn match_archetype<'i>(
    archetype: &ArchetypeRecord,
    index: &'i MacroIndex<'_>,
    min_overlap: usize,
) -> Result<(&'i MacroRecord, usize), (MatchReason, Vec<String>)> {
    let tokens = archetype_tokens(archetype);
    let faction_codes: Vec<&str> = archetype
        .factions
        .iter()
        .filter_map(|f| race_code(f))
        .collect();

    let mut ranked: Vec<(RankKey<'_>, &IndexedMacro<'_>)> = index
        .candidates(&tokens)
        .into_iter()
        .filter(|c| c.record.size_class == archetype.size)
        .filter_map(|c| {
            let score = tokens.overlap(&c.tokens);
            (score >= min_overlap).then(|| (rank_key(archetype, &faction_codes, c, score), c))
        })
        .collect();

    if ranked.is_empty() {
        return Err((MatchReason::NoCandidates, Vec::new()));
    }
    ranked.sort_by(|a, b| a.0.cmp(&b.0));

    let (best_key, best) = &ranked[0];
    let tied: Vec<&IndexedMacro<'_>> = ranked
        .iter()
        .take_while(|(key, _)| key == best_key)
        .map(|(_, c)| *c)
        .collect();
    if tied.len() > 1 {
        let tied = tied
            .iter()
            .map(|c| format!("{} ({})", c.record.macro_id, c.record.provenance))
            .collect();
        return Err((MatchReason::AmbiguousTie, tied));
    }

    Ok((best.record, best_key.0.0))
}

/// First definition of each archetype id in load order; masstraffic dropped.
fn unique_archetypes<'a>(
    archetypes: &'a [ArchetypeRecord],
    diagnostics: &mut Diagnostics,
) -> Vec<&'a ArchetypeRecord> {
    let mut ordered: Vec<&ArchetypeRecord> = archetypes.iter().collect();
    ordered.sort_by_key(|a| a.provenance.load_order);

    let mut seen: BTreeMap<&str, &ArchetypeRecord> = BTreeMap::new();
    let mut out = Vec::new();
    for archetype in ordered {
        if archetype.archetype_id.to_ascii_lowercase().starts_with(MASSTRAFFIC_TOKEN) {
            debug!(archetype = %archetype.archetype_id, "skipping masstraffic archetype");
            continue;
        }
        if let Some(first) = seen.get(archetype.archetype_id.as_str()) {
            diagnostics.warn(
                IssueKind::DuplicateArchetype,
                &archetype.provenance,
                archetype.archetype_id.clone(),
                format!("already defined by {}; ignored", first.provenance),
            );
            continue;
        }
        seen.insert(&archetype.archetype_id, archetype);
        out.push(archetype);
    }
    out
}

/// Match every archetype against the indexed macros.
pub fn match_all(
    archetypes: &[ArchetypeRecord],
    index: &MacroIndex<'_>,
    config: &BuildConfig,
    diagnostics: &mut Diagnostics,
) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();

    for archetype in unique_archetypes(archetypes, diagnostics) {
        match match_archetype(archetype, index, config.min_overlap) {
            Ok((hull, score)) => {
                debug!(
                    archetype = %archetype.archetype_id,
                    hull = %hull.macro_id,
                    score,
                    "matched hull"
                );
                outcome
                    .matches
                    .insert(archetype.archetype_id.clone(), Some(hull.macro_id.clone()));
                outcome.hulls.push(HullMatch {
                    archetype: archetype.clone(),
                    hull: hull.clone(),
                    score,
                });
                outcome.report.matched += 1;
            }
            Err((reason, tied)) => {
                debug!(archetype = %archetype.archetype_id, %reason, "no hull");
                outcome.matches.insert(archetype.archetype_id.clone(), None);
                outcome.report.issues.push(MatchIssue {
                    archetype_id: archetype.archetype_id.clone(),
                    provenance: archetype.provenance.to_string(),
                    reason,
                    tied,
                });
            }
        }
    }

    outcome
        .report
        .issues
        .sort_by(|a, b| a.archetype_id.cmp(&b.archetype_id));
    info!(
        matched = outcome.report.matched,
        unmatched = outcome.report.issues.len(),
        "matched archetypes to hulls"
    );
    outcome
}
