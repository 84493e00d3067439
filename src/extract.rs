//! Record extraction from parsed X4 documents
//!
//! Turns one [`Element`] tree into typed raw records. Extraction is pure and
//! total: a malformed record is skipped and reported through
//! [`Diagnostics`], it never aborts the rest of the document.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::diagnostics::{Diagnostics, IssueKind};
use crate::models::{
    ArchetypeRecord, ComponentRecord, MacroRecord, Price, ProductionMethod, Provenance, SizeClass,
    SlotCategory, SlotCounts, WareDefinition, WareDetails, WareRecord,
};
use crate::tokens::tokenize;
use crate::xml::Element;

/// `<add sel="/wares/ware[@id='ship_arg_l_destroyer_01_a']">`
static WARE_SELECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"ware\[@id\s*=\s*['"]([^'"]+)['"]\]\s*$"#).expect("ware selector regex")
});

/// `<add sel="/wares/ware[@id='hullparts']/production[@method='default']/primary">`
static NESTED_WARE_SELECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"ware\[@id\s*=\s*['"]([^'"]+)['"]\]\s*/(.+)$"#).expect("nested ware selector regex")
});

/// Tag priority used to name an archetype's role.
const ROLE_PRIORITY: &[&str] = &[
    "carrier",
    "destroyer",
    "battleship",
    "frigate",
    "corvette",
    "bomber",
    "fighter",
    "scout",
    "miner",
    "trader",
    "freighter",
    "transport",
    "builder",
    "resupply",
    "gunboat",
    "yacht",
    "luxury",
    "envoy",
];

const ROLE_NOISE: &[&str] = &[
    "military", "civilian", "mission", "small", "medium", "large", "xl", "ship",
];

/// Raw records pulled from one or more documents.
#[derive(Debug, Default)]
pub struct Extracted {
    pub wares: Vec<WareRecord>,
    pub archetypes: Vec<ArchetypeRecord>,
    pub macros: Vec<MacroRecord>,
    pub components: Vec<ComponentRecord>,
    pub diagnostics: Diagnostics,
}

impl Extracted {
    pub fn absorb(&mut self, other: Extracted) {
        self.wares.extend(other.wares);
        self.archetypes.extend(other.archetypes);
        self.macros.extend(other.macros);
        self.components.extend(other.components);
        self.diagnostics.extend(other.diagnostics);
    }

    fn method_count(&self) -> usize {
        self.wares.iter().map(|w| w.methods.len()).sum()
    }
}

impl fmt::Display for Extracted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Extracted {} ware records ({} production methods), {} archetypes, {} macros, {} component layouts. Warnings: {}",
            self.wares.len(),
            self.method_count(),
            self.archetypes.len(),
            self.macros.len(),
            self.components.len(),
            self.diagnostics.len()
        )
    }
}

/// Extract every record in a document, dispatching on the root element.
pub fn extract_document(root: &Element, provenance: &Provenance) -> Extracted {
    let mut out = Extracted::default();
    match root.name.as_str() {
        "diff" => {
            for op in root.children_named("add") {
                extract_patch(op, provenance, &mut out);
            }
        }
        _ => extract_children(root, provenance, &mut out),
    }
    out
}

fn extract_children(parent: &Element, provenance: &Provenance, out: &mut Extracted) {
    for child in &parent.children {
        match child.name.as_str() {
            "ware" => {
                if let Some(record) = ware_definition(child, provenance, &mut out.diagnostics) {
                    out.wares.push(record);
                }
            }
            "ship" => {
                if let Some(record) = archetype(child, provenance, &mut out.diagnostics) {
                    out.archetypes.push(record);
                }
            }
            "macro" => {
                if let Some(record) = hull_macro(child, provenance, &mut out.diagnostics) {
                    out.macros.push(record);
                }
            }
            "component" => {
                if let Some(record) = component(child, provenance, &mut out.diagnostics) {
                    out.components.push(record);
                }
            }
            "wares" | "ships" | "macros" | "components" => extract_children(child, provenance, out),
            _ => {}
        }
    }
}

/// One `<add>` operation of an extension patch document.
fn extract_patch(op: &Element, provenance: &Provenance, out: &mut Extracted) {
    let target = op
        .attr("sel")
        .and_then(|sel| WARE_SELECTOR.captures(sel))
        .map(|caps| caps[1].to_string());

    match target {
        Some(ware_id) => {
            let productions: Vec<&Element> = op.children_named("production").collect();
            if productions.is_empty() {
                return;
            }
            match parse_methods(productions.into_iter()) {
                Ok(methods) => out.wares.push(WareRecord {
                    ware_id,
                    provenance: provenance.clone(),
                    definition: None,
                    methods,
                }),
                Err(reason) => out.diagnostics.warn(
                    IssueKind::Structural,
                    provenance,
                    ware_id,
                    format!("injected production skipped: {reason}"),
                ),
            }
        }
        None => match op.attr("sel").and_then(|sel| NESTED_WARE_SELECTOR.captures(sel)) {
            // nothing below a ware is extracted except through its production
            Some(caps) if caps[2].contains("production") => out.diagnostics.warn(
                IssueKind::Structural,
                provenance,
                caps[1].to_string(),
                format!("unsupported production patch '{}' skipped", &caps[2]),
            ),
            Some(_) => {}
            None => extract_children(op, provenance, out),
        },
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integers are sometimes written as floats (`93000.0`); truncate those.
fn parse_truncated(raw: &str) -> Option<i64> {
    parse_number(raw).map(|v| v.trunc() as i64)
}

/// Accepts `[a, b]` and space separated lists.
pub fn parse_list(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let s = raw.trim();
    if let Some(inner) = s.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        inner
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    } else {
        s.split_whitespace().map(str::to_string).collect()
    }
}

fn parse_method(prod: &Element) -> Result<ProductionMethod, String> {
    let method = prod.attr("method").unwrap_or("default").to_string();

    let time = match prod.attr("time") {
        Some(raw) => parse_number(raw)
            .ok_or_else(|| format!("method '{method}': non-numeric time '{raw}'"))?,
        None => 0.0,
    };

    let amount = match prod.attr("amount") {
        Some(raw) => parse_truncated(raw)
            .filter(|v| *v >= 0)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| format!("method '{method}': invalid amount '{raw}'"))?,
        None => 1,
    };

    let mut resources: Vec<(String, f64)> = Vec::new();
    if let Some(primary) = prod.child("primary") {
        for entry in primary.children_named("ware") {
            let ware = entry
                .attr("ware")
                .ok_or_else(|| format!("method '{method}': resource without ware id"))?;
            let raw = entry.attr("amount").unwrap_or("");
            let qty = parse_number(raw).ok_or_else(|| {
                format!("method '{method}': non-numeric amount '{raw}' for resource '{ware}'")
            })?;
            if resources.iter().any(|(id, _)| id == ware) {
                return Err(format!(
                    "method '{method}': resource '{ware}' listed twice"
                ));
            }
            resources.push((ware.to_string(), qty));
        }
    }

    Ok(ProductionMethod {
        method,
        time,
        amount,
        name: prod.attr("name").map(str::to_string),
        tags: parse_list(prod.attr("tags")),
        resources,
    })
}

fn parse_methods<'a>(
    productions: impl Iterator<Item = &'a Element>,
) -> Result<Vec<ProductionMethod>, String> {
    productions.map(parse_method).collect()
}

fn parse_price(el: &Element) -> Result<Price, String> {
    let field = |name: &str| -> Result<i64, String> {
        match el.attr(name) {
            Some(raw) => parse_truncated(raw).ok_or_else(|| format!("non-numeric price {name} '{raw}'")),
            None => Ok(0),
        }
    };
    Ok(Price {
        min: field("min")?,
        average: field("average")?,
        max: field("max")?,
    })
}

fn ware_definition(
    el: &Element,
    provenance: &Provenance,
    diag: &mut Diagnostics,
) -> Option<WareRecord> {
    let Some(ware_id) = el.attr("id") else {
        diag.warn(
            IssueKind::Structural,
            provenance,
            "ware",
            "ware element without id skipped",
        );
        return None;
    };

    let methods = match parse_methods(el.children_named("production")) {
        Ok(methods) => methods,
        Err(reason) => {
            diag.warn(
                IssueKind::Structural,
                provenance,
                ware_id,
                format!("ware skipped: {reason}"),
            );
            return None;
        }
    };

    let price = match el.child("price").map(parse_price).transpose() {
        Ok(price) => price,
        Err(reason) => {
            diag.warn(
                IssueKind::Structural,
                provenance,
                ware_id,
                format!("price dropped: {reason}"),
            );
            None
        }
    };

    let details = WareDetails {
        name: el.attr("name").map(str::to_string),
        description: el.attr("description").map(str::to_string),
        group: el.attr("group").map(str::to_string),
        volume: el.attr("volume").and_then(parse_truncated),
        tags: parse_list(el.attr("tags")),
        component: el
            .child("component")
            .and_then(|c| c.attr("ref"))
            .map(str::to_string),
        licence: el
            .child("restriction")
            .and_then(|r| r.attr("licence"))
            .map(str::to_string),
        owners: el
            .children_named("owner")
            .filter_map(|o| o.attr("faction"))
            .map(str::to_string)
            .collect(),
    };

    Some(WareRecord {
        ware_id: ware_id.to_string(),
        provenance: provenance.clone(),
        definition: Some(WareDefinition {
            transport: el.attr("transport").unwrap_or("other").to_ascii_lowercase(),
            details,
            price,
        }),
        methods,
    })
}

fn infer_role(tags: &[String]) -> Option<String> {
    let tags: Vec<String> = tags
        .iter()
        .map(|t| t.to_ascii_lowercase())
        .filter(|t| !ROLE_NOISE.contains(&t.as_str()))
        .collect();
    ROLE_PRIORITY
        .iter()
        .find(|role| tags.iter().any(|t| t == *role))
        .map(|role| role.to_string())
        .or_else(|| tags.first().cloned())
}

fn archetype(
    el: &Element,
    provenance: &Provenance,
    diag: &mut Diagnostics,
) -> Option<ArchetypeRecord> {
    let Some(archetype_id) = el.attr("id") else {
        diag.warn(
            IssueKind::Structural,
            provenance,
            "ship",
            "ship element without id skipped",
        );
        return None;
    };

    let category = el.child("category");
    let size_raw = category.and_then(|c| c.attr("size"));
    let Some(size) = size_raw.and_then(SizeClass::parse) else {
        diag.warn(
            IssueKind::Structural,
            provenance,
            archetype_id,
            format!("archetype skipped: unknown size '{}'", size_raw.unwrap_or("")),
        );
        return None;
    };

    let tags = parse_list(category.and_then(|c| c.attr("tags")));
    let factions = parse_list(category.and_then(|c| c.attr("faction")))
        .into_iter()
        .map(|f| f.to_ascii_lowercase())
        .collect();

    Some(ArchetypeRecord {
        archetype_id: archetype_id.to_string(),
        provenance: provenance.clone(),
        group: el.attr("group").map(str::to_string),
        size,
        factions,
        role: infer_role(&tags),
        tags,
    })
}

fn optional_count(
    value: Option<&str>,
    what: &str,
    macro_id: &str,
    provenance: &Provenance,
    diag: &mut Diagnostics,
) -> Option<u32> {
    let raw = value?;
    match parse_truncated(raw).and_then(|v| u32::try_from(v).ok()) {
        Some(v) => Some(v),
        None => {
            diag.warn(
                IssueKind::Structural,
                provenance,
                macro_id,
                format!("ignored non-numeric {what} '{raw}'"),
            );
            None
        }
    }
}

fn hull_macro(el: &Element, provenance: &Provenance, diag: &mut Diagnostics) -> Option<MacroRecord> {
    let class = el.attr("class")?;
    if !class.to_ascii_lowercase().starts_with("ship_") {
        return None;
    }

    let Some(macro_id) = el.attr("name") else {
        diag.warn(
            IssueKind::Structural,
            provenance,
            "macro",
            "ship macro without name skipped",
        );
        return None;
    };
    let Some(size_class) = SizeClass::parse(class) else {
        diag.warn(
            IssueKind::Structural,
            provenance,
            macro_id,
            format!("macro skipped: unknown class '{class}'"),
        );
        return None;
    };

    let properties = el.child("properties");
    let hull_raw = properties
        .and_then(|p| p.descendant("hull"))
        .and_then(|h| h.attr("max").or_else(|| h.attr("value")).or_else(|| h.attr("hull")));
    let crew_raw = properties
        .and_then(|p| p.descendant("people"))
        .and_then(|p| p.attr("capacity"));

    Some(MacroRecord {
        macro_id: macro_id.to_string(),
        provenance: provenance.clone(),
        size_class,
        hull_hp: optional_count(hull_raw, "hull", macro_id, provenance, diag),
        crew: optional_count(crew_raw, "crew capacity", macro_id, provenance, diag),
        slots: SlotCounts::default(),
        component_ref: el
            .child("component")
            .and_then(|c| c.attr("ref"))
            .map(str::to_string),
        name_ref: properties
            .and_then(|p| p.descendant("identification"))
            .and_then(|i| i.attr("name"))
            .map(str::to_string),
        masstraffic: tokenize(macro_id).contains(crate::config::MASSTRAFFIC_TOKEN),
    })
}

fn slot_size(name: &str, tags: &[&str]) -> Option<SizeClass> {
    for tag in tags {
        match *tag {
            "extralarge" => return Some(SizeClass::XL),
            "large" => return Some(SizeClass::L),
            "medium" => return Some(SizeClass::M),
            "small" => return Some(SizeClass::S),
            _ => {}
        }
    }
    let padded = format!("_{name}_");
    [SizeClass::XL, SizeClass::L, SizeClass::M, SizeClass::S]
        .into_iter()
        .find(|size| padded.contains(&format!("_{}_", size.token())))
}

/// Classify one `<connection>`; engines win over shields over turrets over weapons.
pub fn classify_connection(name: &str, tags: &str) -> Option<(SlotCategory, Option<SizeClass>)> {
    let name = name.to_ascii_lowercase();
    let tags = tags.to_ascii_lowercase();
    let tag_words: Vec<&str> = tags.split_whitespace().collect();
    let blob = format!("{name} {tags}");

    let category = if blob.contains("engine") {
        SlotCategory::Engine
    } else if name.contains("shieldgen") || tag_words.contains(&"shield") {
        SlotCategory::Shield
    } else if blob.contains("turret") {
        SlotCategory::Turret
    } else if blob.contains("weapon") {
        SlotCategory::Weapon
    } else {
        return None;
    };

    Some((category, slot_size(&name, &tag_words)))
}

fn component(
    el: &Element,
    provenance: &Provenance,
    diag: &mut Diagnostics,
) -> Option<ComponentRecord> {
    let Some(name) = el.attr("name") else {
        diag.warn(
            IssueKind::Structural,
            provenance,
            "component",
            "component without name skipped",
        );
        return None;
    };

    let mut slots = SlotCounts::default();
    for conn in el.descendants_named("connection") {
        let conn_name = conn.attr("name").unwrap_or("");
        let conn_tags = conn.attr("tags").unwrap_or("");
        if let Some((category, size)) = classify_connection(conn_name, conn_tags) {
            slots.add(category, size);
        }
    }

    Some(ComponentRecord {
        name: name.to_string(),
        provenance: provenance.clone(),
        slots,
    })
}
