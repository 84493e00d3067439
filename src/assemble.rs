//! Catalogue assembly: hull and equipment rows
//!
//! Thin composition over the merged [`Catalogue`] and the matcher output.
//! Nothing here reads source documents again.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::matcher::HullMatch;
use crate::merge::Catalogue;
use crate::models::{
    CanonicalWareEntry, EquipmentCategory, EquipmentRow, HullRow, SizeClass,
};
use crate::tokens::{race_code, tokenize};

/// `turret_par_m_shotgun_01_mk1` -> `turret_par_m_shotgun_mk1`
static COSMETIC_VARIANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)_(\d{2})_(mk\d+)$").expect("variant regex"));

static MARK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|_)mk(\d+)(?:_|$)").expect("mark regex"));

const CATEGORY_PREFIXES: &[(&str, EquipmentCategory)] = &[
    ("engine", EquipmentCategory::Engines),
    ("eng", EquipmentCategory::Engines),
    ("thruster", EquipmentCategory::Thrusters),
    ("thrust", EquipmentCategory::Thrusters),
    ("shieldgen", EquipmentCategory::Shields),
    ("shield", EquipmentCategory::Shields),
    ("weapon", EquipmentCategory::Weapons),
    ("turret", EquipmentCategory::Turrets),
];

const SIZE_CODES: &[&str] = &["s", "m", "l", "xl"];

/// `_01_a` Vanguard, `_01_b` Sentinel, `_02` E.
pub fn variant_label(macro_id: &str) -> &'static str {
    let id = macro_id.to_ascii_lowercase();
    if id.contains("_01_a_") || id.ends_with("_01_a") {
        "Vanguard"
    } else if id.contains("_01_b_") || id.ends_with("_01_b") {
        "Sentinel"
    } else if id.contains("_02_") || id.ends_with("_02") {
        "E"
    } else {
        ""
    }
}

fn production_ware<'c>(
    catalogue: &'c Catalogue,
    macro_id: &str,
) -> Option<(&'c str, &'c CanonicalWareEntry)> {
    catalogue.by_component(macro_id).or_else(|| {
        macro_id
            .strip_suffix("_macro")
            .and_then(|ware_id| catalogue.get_entry(ware_id))
    })
}

fn hull_race(m: &HullMatch) -> String {
    m.archetype
        .factions
        .iter()
        .find_map(|f| race_code(f))
        .or_else(|| {
            tokenize(&m.hull.macro_id)
                .races()
                .next()
                .and_then(race_code)
        })
        .map(|code| code.to_ascii_uppercase())
        .unwrap_or_default()
}

fn hull_row(m: &HullMatch, catalogue: &Catalogue) -> HullRow {
    let ware = production_ware(catalogue, &m.hull.macro_id);
    let method = ware.and_then(|(_, w)| w.primary_method()).map(|(_, method)| method);

    HullRow {
        archetype_id: m.archetype.archetype_id.clone(),
        macro_id: m.hull.macro_id.clone(),
        ware_id: ware.map(|(id, _)| id.to_string()),
        provenance: m.archetype.provenance.clone(),
        hull_name: m
            .hull
            .name_ref
            .clone()
            .unwrap_or_else(|| m.hull.macro_id.clone()),
        race: hull_race(m),
        size: m.archetype.size,
        role: m
            .archetype
            .role
            .clone()
            .unwrap_or_else(|| "Unknown".to_string()),
        variant: variant_label(&m.hull.macro_id).to_string(),
        crew: m.hull.crew,
        hull_hp: m.hull.hull_hp,
        slots: m.hull.slots.clone(),
        price: ware.and_then(|(_, w)| w.price),
        build_time: method.map(|p| p.time),
        resources: method.map(|p| p.resources.clone()).unwrap_or_default(),
    }
}

/// One row per matched archetype, base game first.
pub fn hull_rows(matches: &[HullMatch], catalogue: &Catalogue) -> Vec<HullRow> {
    let mut rows: Vec<HullRow> = matches.iter().map(|m| hull_row(m, catalogue)).collect();
    rows.sort_by(|a, b| {
        (!a.provenance.is_base(), a.provenance.name(), a.size, &a.archetype_id).cmp(&(
            !b.provenance.is_base(),
            b.provenance.name(),
            b.size,
            &b.archetype_id,
        ))
    });
    rows
}

pub fn equipment_category(ware_id: &str) -> Option<EquipmentCategory> {
    let lower = ware_id.to_ascii_lowercase();
    let (prefix, rest) = lower.split_once('_')?;
    if rest.is_empty() {
        return None;
    }
    CATEGORY_PREFIXES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, category)| *category)
}

pub fn canonical_equipment_id(ware_id: &str) -> String {
    COSMETIC_VARIANT.replace(ware_id, "_$2").into_owned()
}

/// Race, size, mark and descriptor words of an equipment id.
struct IdParts {
    race: String,
    size: Option<SizeClass>,
    mark: Option<String>,
    descriptors: Vec<String>,
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn id_parts(ware_id: &str) -> IdParts {
    let lower = ware_id.to_ascii_lowercase();
    let parts: Vec<&str> = lower.split('_').skip(1).collect();

    let race = parts
        .iter()
        .find_map(|p| race_code(p).filter(|code| code == p))
        .map(|code| code.to_ascii_uppercase())
        .unwrap_or_default();
    let size_idx = parts.iter().position(|p| SIZE_CODES.contains(p));
    let size = size_idx.and_then(|i| SizeClass::parse(parts[i]));
    let mark = MARK.captures(&lower).map(|caps| format!("Mk{}", &caps[1]));

    let start = size_idx.map_or(0, |i| i + 1);
    let descriptors = parts[start..]
        .iter()
        .copied()
        .filter(|p| p.chars().all(|c| c.is_ascii_alphabetic()))
        .filter(|p| race_code(p).is_none() && !SIZE_CODES.contains(p))
        .map(capitalize)
        .collect();

    IdParts {
        race,
        size,
        mark,
        descriptors,
    }
}

fn equipment_name(parts: &IdParts) -> String {
    let mut words: Vec<String> = Vec::new();
    if !parts.race.is_empty() {
        words.push(parts.race.clone());
    }
    if let Some(size) = parts.size {
        words.push(size.as_str().to_string());
    }
    words.extend(parts.descriptors.iter().cloned());
    if let Some(mark) = &parts.mark {
        words.push(mark.clone());
    }
    words.join(" ")
}

/// Buildable equipment wares, one row per canonical id.
pub fn equipment_rows(catalogue: &Catalogue) -> Vec<EquipmentRow> {
    let mut seen: BTreeSet<(EquipmentCategory, String)> = BTreeSet::new();
    let mut by_category: BTreeMap<EquipmentCategory, Vec<EquipmentRow>> = BTreeMap::new();

    for (ware_id, ware) in catalogue.iter() {
        if ware.transport != "equipment" {
            continue;
        }
        let Some(category) = equipment_category(ware_id) else {
            continue;
        };
        let Some((_, method)) = ware.primary_method() else {
            continue;
        };
        let equipment_id = canonical_equipment_id(ware_id);
        if !seen.insert((category, equipment_id.clone())) {
            continue;
        }

        let parts = id_parts(ware_id);
        by_category.entry(category).or_default().push(EquipmentRow {
            category,
            ware_id: ware_id.to_string(),
            name: equipment_name(&parts),
            equipment_id,
            provenance: ware.defined_in.clone(),
            race: parts.race,
            size: parts.size,
            mark: parts.mark,
            price: ware.price,
            build_time: Some(method.time),
            resources: method.resources.clone(),
        });
    }

    by_category.into_values().flatten().collect()
}
