//! Data models for X4 wares, ship archetypes and hull macros

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Dataset a record came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Origin {
    Base,
    Extension(String),
}

/// Origin plus the position of that dataset in the declared load order.
///
/// Base is always position 0. Load order decides merge precedence; the
/// origin itself is only used for diagnostics and the matcher's
/// same-source tie-break.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Provenance {
    pub origin: Origin,
    pub load_order: usize,
}

impl Provenance {
    pub fn base() -> Self {
        Self {
            origin: Origin::Base,
            load_order: 0,
        }
    }

    pub fn extension(name: impl Into<String>, load_order: usize) -> Self {
        Self {
            origin: Origin::Extension(name.into()),
            load_order,
        }
    }

    pub fn is_base(&self) -> bool {
        self.origin == Origin::Base
    }

    pub fn name(&self) -> &str {
        match &self.origin {
            Origin::Base => "base",
            Origin::Extension(name) => name,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Physical size class shared by archetypes, macros and slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SizeClass {
    XS,
    S,
    M,
    L,
    XL,
}

impl SizeClass {
    /// Accepts `ship_l`, `size_l`, `l` and `L` style spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_ascii_lowercase();
        let code = lower
            .strip_prefix("ship_")
            .or_else(|| lower.strip_prefix("size_"))
            .unwrap_or(&lower);
        match code {
            "xs" => Some(SizeClass::XS),
            "s" => Some(SizeClass::S),
            "m" => Some(SizeClass::M),
            "l" => Some(SizeClass::L),
            "xl" => Some(SizeClass::XL),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeClass::XS => "XS",
            SizeClass::S => "S",
            SizeClass::M => "M",
            SizeClass::L => "L",
            SizeClass::XL => "XL",
        }
    }

    /// Lowercase form as it appears inside identifiers.
    pub fn token(&self) -> &'static str {
        match self {
            SizeClass::XS => "xs",
            SizeClass::S => "s",
            SizeClass::M => "m",
            SizeClass::L => "l",
            SizeClass::XL => "xl",
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Price {
    pub min: i64,
    pub average: i64,
    pub max: i64,
}

/// Descriptive fields of a ware, established by its first definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WareDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub licence: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub owners: Vec<String>,
}

/// One production method as read from a source document.
///
/// Resource quantities stay as read; the merger decides whether they are
/// valid positive integers.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductionMethod {
    pub method: String,
    pub time: f64,
    pub amount: u32,
    pub name: Option<String>,
    pub tags: Vec<String>,
    pub resources: Vec<(String, f64)>,
}

/// Full `<ware>` definition.
#[derive(Debug, Clone, PartialEq)]
pub struct WareDefinition {
    pub transport: String,
    pub details: WareDetails,
    pub price: Option<Price>,
}

/// One occurrence of a ware id in one source document.
///
/// `definition` is `None` for records produced by an extension's
/// `<add sel="...[@id='x']">` patch, which only contributes methods.
#[derive(Debug, Clone, PartialEq)]
pub struct WareRecord {
    pub ware_id: String,
    pub provenance: Provenance,
    pub definition: Option<WareDefinition>,
    pub methods: Vec<ProductionMethod>,
}

impl WareRecord {
    pub fn component_ref(&self) -> Option<&str> {
        self.definition
            .as_ref()
            .and_then(|d| d.details.component.as_deref())
    }
}

/// A buildable ship class from `ships.xml`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchetypeRecord {
    pub archetype_id: String,
    pub provenance: Provenance,
    pub group: Option<String>,
    pub size: SizeClass,
    /// Faction tags, lowercase as declared (`argon`, `antigone`, ...).
    pub factions: Vec<String>,
    pub tags: Vec<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotCategory {
    Engine,
    Shield,
    Weapon,
    Turret,
}

/// Equipment slot multiset keyed by category and (when known) slot size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotCounts(BTreeMap<(SlotCategory, Option<SizeClass>), u32>);

impl SlotCounts {
    pub fn add(&mut self, category: SlotCategory, size: Option<SizeClass>) {
        *self.0.entry((category, size)).or_default() += 1;
    }

    pub fn total(&self, category: SlotCategory) -> u32 {
        self.0
            .iter()
            .filter(|((c, _), _)| *c == category)
            .map(|(_, n)| *n)
            .sum()
    }

    pub fn sized(&self, category: SlotCategory, size: SizeClass) -> u32 {
        self.0.get(&(category, Some(size))).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Slot layout of one `<component>` geometry definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRecord {
    pub name: String,
    pub provenance: Provenance,
    pub slots: SlotCounts,
}

/// Physical hull definition from a ship `*_macro.xml`.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroRecord {
    pub macro_id: String,
    pub provenance: Provenance,
    pub size_class: SizeClass,
    pub hull_hp: Option<u32>,
    pub crew: Option<u32>,
    pub slots: SlotCounts,
    pub component_ref: Option<String>,
    /// Raw `{page,id}` name reference, untranslated.
    pub name_ref: Option<String>,
    pub masstraffic: bool,
}

/// A production method after merge and validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalMethod {
    pub time: f64,
    pub amount: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub resources: BTreeMap<String, u32>,
    #[serde(skip)]
    pub provenance: Provenance,
}

/// The merged, conflict-checked view of one ware.
///
/// Exists as soon as any source defines the ware; buildable only when at
/// least one production method is installed.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalWareEntry {
    pub transport: String,
    pub details: WareDetails,
    pub price: Option<Price>,
    pub production_methods: BTreeMap<String, CanonicalMethod>,
    pub defined_in: Provenance,
}

impl CanonicalWareEntry {
    pub fn is_buildable(&self) -> bool {
        !self.production_methods.is_empty()
    }

    pub fn component_ref(&self) -> Option<&str> {
        self.details.component.as_deref()
    }

    /// The `default` method when present, otherwise the first by name.
    pub fn primary_method(&self) -> Option<(&str, &CanonicalMethod)> {
        self.production_methods
            .get_key_value("default")
            .or_else(|| self.production_methods.iter().next())
            .map(|(k, v)| (k.as_str(), v))
    }
}

// Flat shape: { "<transport>": {...}, "price": {...}, "productionMethods": {...} }
impl Serialize for CanonicalWareEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(&self.transport, &self.details)?;
        if let Some(price) = &self.price {
            map.serialize_entry("price", price)?;
        }
        map.serialize_entry("productionMethods", &self.production_methods)?;
        map.end()
    }
}

/// Joined archetype + macro + production row.
#[derive(Debug, Clone, PartialEq)]
pub struct HullRow {
    pub archetype_id: String,
    pub macro_id: String,
    pub ware_id: Option<String>,
    pub provenance: Provenance,
    pub hull_name: String,
    pub race: String,
    pub size: SizeClass,
    pub role: String,
    pub variant: String,
    pub crew: Option<u32>,
    pub hull_hp: Option<u32>,
    pub slots: SlotCounts,
    pub price: Option<Price>,
    pub build_time: Option<f64>,
    pub resources: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EquipmentCategory {
    Engines,
    Thrusters,
    Shields,
    Weapons,
    Turrets,
}

impl EquipmentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentCategory::Engines => "Engines",
            EquipmentCategory::Thrusters => "Thrusters",
            EquipmentCategory::Shields => "Shields",
            EquipmentCategory::Weapons => "Weapons",
            EquipmentCategory::Turrets => "Turrets",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquipmentRow {
    pub category: EquipmentCategory,
    pub ware_id: String,
    /// Ware id with the cosmetic `_NN` variant before the mark removed.
    pub equipment_id: String,
    /// Readable label built from the id parts, e.g. `PAR M Shotgun Mk1`.
    pub name: String,
    pub provenance: Provenance,
    pub race: String,
    pub size: Option<SizeClass>,
    pub mark: Option<String>,
    pub price: Option<Price>,
    pub build_time: Option<f64>,
    pub resources: BTreeMap<String, u32>,
}
