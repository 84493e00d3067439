//! End-to-end build: discover, extract, merge, index, match, assemble

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::assemble::{equipment_rows, hull_rows};
use crate::config::BuildConfig;
use crate::diagnostics::{Diagnostics, IssueKind};
use crate::discover::find_source_files;
use crate::error::{CatalogueError, Result};
use crate::extract::{Extracted, extract_document};
use crate::index::MacroIndex;
use crate::matcher::{MatchOutcome, match_all};
use crate::merge::{Catalogue, merge};
use crate::models::{ComponentRecord, EquipmentRow, HullRow, MacroRecord};
use crate::xml::parse_file;

/// Everything one build produces.
#[derive(Debug)]
pub struct Build {
    pub catalogue: Catalogue,
    pub matches: MatchOutcome,
    pub hulls: Vec<HullRow>,
    pub equipment: Vec<EquipmentRow>,
    pub diagnostics: Diagnostics,
}

impl fmt::Display for Build {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Catalogue: {} wares ({} buildable), {} hulls, {} equipment items",
            self.catalogue.len(),
            self.catalogue.buildable_count(),
            self.hulls.len(),
            self.equipment.len()
        )?;
        write!(f, "{}", self.matches.report)?;
        write!(f, "{}", self.diagnostics)
    }
}

/// Parse and extract every source file, in load order.
///
/// A document that is not well-formed XML is skipped with a structural
/// warning; an unreadable file aborts.
pub fn extract_sources(root: &Path, config: &BuildConfig) -> Result<Extracted> {
    let files = find_source_files(root, config)?;
    info!(files = files.len(), root = %root.display(), "found source files");

    let mut extracted = Extracted::default();
    for file in &files {
        let doc = match parse_file(&file.path) {
            Ok(doc) => doc,
            Err(CatalogueError::Xml { path, detail }) => {
                extracted.diagnostics.warn(
                    IssueKind::Structural,
                    &file.provenance,
                    path.display().to_string(),
                    format!("document skipped: {detail}"),
                );
                continue;
            }
            Err(e) => return Err(e),
        };
        let records = extract_document(&doc, &file.provenance);
        debug!(path = %file.path.display(), kind = ?file.kind, "{records}");
        extracted.absorb(records);
    }

    info!("{extracted}");
    Ok(extracted)
}

/// Join each macro to its component slot layout.
///
/// A layout from the macro's own dataset wins; otherwise the one loaded
/// first.
pub fn attach_components(
    macros: &mut [MacroRecord],
    components: &[ComponentRecord],
    diagnostics: &mut Diagnostics,
) {
    let mut by_name: BTreeMap<&str, Vec<&ComponentRecord>> = BTreeMap::new();
    for component in components {
        by_name.entry(component.name.as_str()).or_default().push(component);
    }

    for hull in macros.iter_mut() {
        let Some(component_ref) = hull.component_ref.as_deref() else {
            continue;
        };
        let layout = by_name.get(component_ref).and_then(|found| {
            found
                .iter()
                .find(|c| c.provenance == hull.provenance)
                .or_else(|| found.iter().min_by_key(|c| c.provenance.load_order))
        });
        match layout {
            Some(layout) => hull.slots = layout.slots.clone(),
            None => diagnostics.warn(
                IssueKind::MissingComponent,
                &hull.provenance,
                hull.macro_id.clone(),
                format!("component '{component_ref}' not found; slot counts left empty"),
            ),
        }
    }
}

/// Merge only: the canonical catalogue and the warnings met on the way.
pub fn build_catalogue(root: &Path, config: &BuildConfig) -> Result<(Catalogue, Diagnostics)> {
    config.validate()?;
    let mut extracted = extract_sources(root, config)?;
    let catalogue = merge(&extracted.wares, &mut extracted.diagnostics)?;
    Ok((catalogue, extracted.diagnostics))
}

/// Full build.
pub fn build(root: &Path, config: &BuildConfig) -> Result<Build> {
    config.validate()?;
    let Extracted {
        wares,
        archetypes,
        mut macros,
        components,
        mut diagnostics,
    } = extract_sources(root, config)?;

    let catalogue = merge(&wares, &mut diagnostics)?;

    attach_components(&mut macros, &components, &mut diagnostics);
    let index = MacroIndex::build(&macros, config);
    info!(
        hulls = index.len(),
        excluded = index.excluded(),
        "indexed hull macros"
    );
    let matches = match_all(&archetypes, &index, config, &mut diagnostics);

    let hulls = hull_rows(&matches.hulls, &catalogue);
    let equipment = equipment_rows(&catalogue);

    if !diagnostics.is_empty() {
        warn!(warnings = diagnostics.len(), "build finished with warnings");
    }
    info!(
        hulls = hulls.len(),
        equipment = equipment.len(),
        "assembled catalogue rows"
    );

    Ok(Build {
        catalogue,
        matches,
        hulls,
        equipment,
        diagnostics,
    })
}
