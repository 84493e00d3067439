//! Recoverable issues collected during a build

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::models::Provenance;

/// What kind of recoverable problem was seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueKind {
    /// A required attribute was missing or malformed; the record was skipped.
    Structural,
    /// Production injected into a ware that no source defines.
    UnknownWare,
    /// A later archetype definition was ignored in favour of the first.
    DuplicateArchetype,
    /// A macro references a component layout that was never found.
    MissingComponent,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IssueKind::Structural => "structural",
            IssueKind::UnknownWare => "unknown ware",
            IssueKind::DuplicateArchetype => "duplicate archetype",
            IssueKind::MissingComponent => "missing component",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub kind: IssueKind,
    pub provenance: String,
    /// Identifier of the offending record, or the element name when no id exists.
    pub context: String,
    pub message: String,
}

/// Aggregated warnings, reported once as a summary rather than per record.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    issues: Vec<Issue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(
        &mut self,
        kind: IssueKind,
        provenance: &Provenance,
        context: impl Into<String>,
        message: impl Into<String>,
    ) {
        let issue = Issue {
            kind,
            provenance: provenance.to_string(),
            context: context.into(),
            message: message.into(),
        };
        debug!(
            kind = %issue.kind,
            provenance = %issue.provenance,
            context = %issue.context,
            "{}",
            issue.message
        );
        self.issues.push(issue);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return writeln!(f, "No extraction warnings.");
        }

        let mut by_kind: BTreeMap<IssueKind, Vec<&Issue>> = BTreeMap::new();
        for issue in &self.issues {
            by_kind.entry(issue.kind).or_default().push(issue);
        }

        writeln!(f, "{} extraction warnings:", self.issues.len())?;
        for (kind, issues) in by_kind {
            writeln!(f, "  {} ({}):", kind, issues.len())?;
            for issue in issues {
                writeln!(
                    f,
                    "    [{}] {}: {}",
                    issue.provenance, issue.context, issue.message
                )?;
            }
        }
        Ok(())
    }
}
