//! Production merger
//!
//! Folds every [`WareRecord`] (base first, then extensions in load order)
//! into one [`Catalogue`]. Overlays accumulate: the first definition of a
//! ware fixes its transport, price and details, and every source may add
//! production methods. Defining the same method twice is a conflict, not
//! an override.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info};

use crate::diagnostics::{Diagnostics, IssueKind};
use crate::error::{CatalogueError, Result};
use crate::models::{CanonicalMethod, CanonicalWareEntry, ProductionMethod, Provenance, WareRecord};

/// The canonical ware catalogue. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Catalogue {
    wares: BTreeMap<String, CanonicalWareEntry>,
    /// `<component ref>` -> lowest ware id naming it.
    #[serde(skip)]
    components: BTreeMap<String, String>,
}

impl Catalogue {
    pub fn get(&self, ware_id: &str) -> Option<&CanonicalWareEntry> {
        self.wares.get(ware_id)
    }

    /// Entry together with the catalogue's own copy of the id.
    pub fn get_entry(&self, ware_id: &str) -> Option<(&str, &CanonicalWareEntry)> {
        self.wares
            .get_key_value(ware_id)
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn exists(&self, ware_id: &str) -> bool {
        self.wares.contains_key(ware_id)
    }

    pub fn is_buildable(&self, ware_id: &str) -> bool {
        self.get(ware_id).is_some_and(|w| w.is_buildable())
    }

    /// Wares in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CanonicalWareEntry)> {
        self.wares.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.wares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wares.is_empty()
    }

    pub fn buildable_count(&self) -> usize {
        self.wares.values().filter(|w| w.is_buildable()).count()
    }

    /// First ware (by id) whose `<component ref>` names this macro.
    pub fn by_component(&self, macro_id: &str) -> Option<(&str, &CanonicalWareEntry)> {
        self.components
            .get(macro_id)
            .and_then(|ware_id| self.get_entry(ware_id))
    }

    /// Pretty JSON with wares, methods and resources in sorted order.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn canonical_resources(
    ware_id: &str,
    method: &ProductionMethod,
    provenance: &Provenance,
) -> Result<BTreeMap<String, u32>> {
    let mut out = BTreeMap::new();
    for (resource, value) in &method.resources {
        let valid = value.is_finite()
            && *value > 0.0
            && value.fract() == 0.0
            && *value <= f64::from(u32::MAX);
        if !valid {
            return Err(CatalogueError::InvalidQuantity {
                ware_id: ware_id.to_string(),
                method: method.method.clone(),
                resource: resource.clone(),
                value: *value,
                provenance: provenance.to_string(),
            });
        }
        out.insert(resource.clone(), *value as u32);
    }
    Ok(out)
}

/// Merge all records into the canonical catalogue.
///
/// Input order within one load-order position is preserved. Fatal on
/// method conflicts, transport mismatches, repeated definitions inside one
/// dataset and non-integer resource quantities.
pub fn merge(records: &[WareRecord], diagnostics: &mut Diagnostics) -> Result<Catalogue> {
    let mut ordered: Vec<&WareRecord> = records.iter().collect();
    // definitions before injections within a dataset
    ordered.sort_by_key(|r| (r.provenance.load_order, r.definition.is_none()));

    let mut wares: BTreeMap<String, CanonicalWareEntry> = BTreeMap::new();
    let mut defined_by: HashMap<&str, Vec<&Provenance>> = HashMap::new();

    // pass 1: definitions
    for record in &ordered {
        let Some(def) = &record.definition else {
            continue;
        };
        let seen = defined_by.entry(record.ware_id.as_str()).or_default();
        if seen.contains(&&record.provenance) {
            return Err(CatalogueError::DuplicateWare {
                ware_id: record.ware_id.clone(),
                provenance: record.provenance.to_string(),
            });
        }
        seen.push(&record.provenance);

        match wares.get(&record.ware_id) {
            Some(existing) if existing.transport != def.transport => {
                return Err(CatalogueError::TransportMismatch {
                    ware_id: record.ware_id.clone(),
                    expected: existing.transport.clone(),
                    expected_in: existing.defined_in.to_string(),
                    found: def.transport.clone(),
                    found_in: record.provenance.to_string(),
                });
            }
            Some(_) => {
                debug!(ware = %record.ware_id, provenance = %record.provenance, "overlay definition");
            }
            None => {
                wares.insert(
                    record.ware_id.clone(),
                    CanonicalWareEntry {
                        transport: def.transport.clone(),
                        details: def.details.clone(),
                        price: def.price,
                        production_methods: BTreeMap::new(),
                        defined_in: record.provenance.clone(),
                    },
                );
            }
        }
    }

    // pass 2: production methods, inline and injected
    for record in &ordered {
        if record.methods.is_empty() {
            continue;
        }
        let Some(entry) = wares.get_mut(&record.ware_id) else {
            diagnostics.warn(
                IssueKind::UnknownWare,
                &record.provenance,
                record.ware_id.clone(),
                format!(
                    "production injected into a ware no source defines; {} method(s) dropped",
                    record.methods.len()
                ),
            );
            continue;
        };

        for method in &record.methods {
            if let Some(existing) = entry.production_methods.get(&method.method) {
                return Err(CatalogueError::MergeConflict {
                    ware_id: record.ware_id.clone(),
                    method: method.method.clone(),
                    first: existing.provenance.to_string(),
                    second: record.provenance.to_string(),
                });
            }
            let resources = canonical_resources(&record.ware_id, method, &record.provenance)?;
            entry.production_methods.insert(
                method.method.clone(),
                CanonicalMethod {
                    time: method.time,
                    amount: method.amount,
                    name: method.name.clone(),
                    tags: method.tags.clone(),
                    resources,
                    provenance: record.provenance.clone(),
                },
            );
        }
    }

    let mut components = BTreeMap::new();
    for (ware_id, entry) in &wares {
        if let Some(component) = entry.component_ref() {
            components
                .entry(component.to_string())
                .or_insert_with(|| ware_id.clone());
        }
    }

    let catalogue = Catalogue { wares, components };
    info!(
        wares = catalogue.len(),
        buildable = catalogue.buildable_count(),
        "merged ware catalogue"
    );
    Ok(catalogue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Price, WareDefinition, WareDetails};

    fn method(name: &str, resources: &[(&str, f64)]) -> ProductionMethod {
        ProductionMethod {
            method: name.to_string(),
            time: 120.0,
            amount: 1,
            name: None,
            tags: vec![],
            resources: resources.iter().map(|(w, q)| (w.to_string(), *q)).collect(),
        }
    }

    fn defined(id: &str, transport: &str, provenance: Provenance, methods: Vec<ProductionMethod>) -> WareRecord {
        WareRecord {
            ware_id: id.to_string(),
            provenance,
            definition: Some(WareDefinition {
                transport: transport.to_string(),
                details: WareDetails::default(),
                price: Some(Price {
                    min: 1,
                    average: 2,
                    max: 3,
                }),
            }),
            methods,
        }
    }

    fn injected(id: &str, provenance: Provenance, methods: Vec<ProductionMethod>) -> WareRecord {
        WareRecord {
            ware_id: id.to_string(),
            provenance,
            definition: None,
            methods,
        }
    }

    fn split() -> Provenance {
        Provenance::extension("ego_dlc_split", 1)
    }

    fn terran() -> Provenance {
        Provenance::extension("ego_dlc_terran", 2)
    }

    fn sample() -> Vec<WareRecord> {
        vec![
            defined(
                "ship_arg_s_fighter_01_a",
                "ship",
                Provenance::base(),
                vec![method("default", &[("energycells", 50.0), ("hullparts", 20.0)])],
            ),
            defined("energycells", "container", Provenance::base(), vec![]),
            injected(
                "ship_arg_s_fighter_01_a",
                terran(),
                vec![method("terran", &[("computronicsubstrate", 10.0)])],
            ),
            injected(
                "ship_arg_s_fighter_01_a",
                split(),
                vec![method("split", &[("energycells", 40.0)])],
            ),
        ]
    }

    // --- Canonical output ---

    #[test]
    fn overlays_accumulate_methods() {
        let mut diag = Diagnostics::new();
        let catalogue = merge(&sample(), &mut diag).unwrap();

        let fighter = catalogue.get("ship_arg_s_fighter_01_a").unwrap();
        let methods: Vec<&str> = fighter.production_methods.keys().map(String::as_str).collect();
        assert_eq!(methods, vec!["default", "split", "terran"]);
        assert_eq!(fighter.production_methods["split"].provenance, split());
        assert_eq!(fighter.transport, "ship");
        assert!(diag.is_empty());
    }

    #[test]
    fn exists_and_buildable_are_distinct() {
        let catalogue = merge(&sample(), &mut Diagnostics::new()).unwrap();
        assert!(catalogue.exists("energycells"));
        assert!(!catalogue.is_buildable("energycells"));
        assert!(catalogue.is_buildable("ship_arg_s_fighter_01_a"));
        assert!(!catalogue.exists("hullparts"));
        assert_eq!(catalogue.buildable_count(), 1);
    }

    #[test]
    fn every_entry_has_one_transport_and_methods_block() {
        let catalogue = merge(&sample(), &mut Diagnostics::new()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&catalogue.to_json().unwrap()).unwrap();
        for (id, entry) in json.as_object().unwrap() {
            let obj = entry.as_object().unwrap();
            assert!(obj.contains_key("productionMethods"), "{id}");
            let transports = obj
                .keys()
                .filter(|k| *k != "price" && *k != "productionMethods")
                .count();
            assert_eq!(transports, 1, "{id}");
        }
        assert_eq!(json["energycells"]["productionMethods"], serde_json::json!({}));
    }

    #[test]
    fn output_is_deterministic() {
        let records = sample();
        let first = merge(&records, &mut Diagnostics::new()).unwrap().to_json().unwrap();
        let second = merge(&records, &mut Diagnostics::new()).unwrap().to_json().unwrap();
        assert_eq!(first, second);

        // the order records arrive in within the input slice does not matter
        // once load order is declared
        let mut shuffled = records.clone();
        shuffled.reverse();
        let third = merge(&shuffled, &mut Diagnostics::new()).unwrap().to_json().unwrap();
        assert_eq!(first, third);
    }

    #[test]
    fn first_definition_owns_price_and_details() {
        let mut later = defined("energycells", "container", split(), vec![]);
        later.definition.as_mut().unwrap().price = Some(Price {
            min: 100,
            average: 200,
            max: 300,
        });
        let mut records = sample();
        records.push(later);

        let catalogue = merge(&records, &mut Diagnostics::new()).unwrap();
        let cells = catalogue.get("energycells").unwrap();
        assert_eq!(cells.price.unwrap().max, 3);
        assert!(cells.defined_in.is_base());
    }

    #[test]
    fn component_lookup() {
        let mut records = sample();
        records[0].definition.as_mut().unwrap().details.component =
            Some("ship_arg_s_fighter_01_a_macro".to_string());
        let catalogue = merge(&records, &mut Diagnostics::new()).unwrap();
        let (id, _) = catalogue.by_component("ship_arg_s_fighter_01_a_macro").unwrap();
        assert_eq!(id, "ship_arg_s_fighter_01_a");
        assert!(catalogue.by_component("nothing_macro").is_none());
    }

    #[test]
    fn shared_component_resolves_to_lowest_ware_id() {
        let mut records = sample();
        for i in [0, 1] {
            records[i].definition.as_mut().unwrap().details.component =
                Some("ship_arg_s_fighter_01_a_macro".to_string());
        }
        let catalogue = merge(&records, &mut Diagnostics::new()).unwrap();
        let (id, entry) = catalogue.by_component("ship_arg_s_fighter_01_a_macro").unwrap();
        assert_eq!(id, "energycells");
        assert_eq!(entry.transport, "container");
    }

    // --- Fatal conditions ---

    #[test]
    fn duplicate_method_names_both_provenances() {
        let mut records = sample();
        records.push(injected(
            "ship_arg_s_fighter_01_a",
            terran(),
            vec![method("split", &[("hullparts", 5.0)])],
        ));

        let err = merge(&records, &mut Diagnostics::new()).unwrap_err();
        match &err {
            CatalogueError::MergeConflict {
                ware_id,
                method,
                first,
                second,
            } => {
                assert_eq!(ware_id, "ship_arg_s_fighter_01_a");
                assert_eq!(method, "split");
                assert_eq!(first, "ego_dlc_split");
                assert_eq!(second, "ego_dlc_terran");
            }
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains("ego_dlc_split") && message.contains("ego_dlc_terran"));
    }

    #[test]
    fn inline_method_redefined_by_extension_conflicts() {
        let mut records = sample();
        records.push(injected(
            "ship_arg_s_fighter_01_a",
            split(),
            vec![method("default", &[("energycells", 50.0), ("hullparts", 20.0)])],
        ));
        assert!(matches!(
            merge(&records, &mut Diagnostics::new()),
            Err(CatalogueError::MergeConflict { .. })
        ));
    }

    #[test]
    fn transport_change_is_fatal() {
        let mut records = sample();
        records.push(defined("energycells", "liquid", terran(), vec![]));
        let err = merge(&records, &mut Diagnostics::new()).unwrap_err();
        assert!(matches!(
            err,
            CatalogueError::TransportMismatch { ref ware_id, ref found_in, .. }
                if ware_id == "energycells" && found_in == "ego_dlc_terran"
        ));
    }

    #[test]
    fn non_integer_quantity_is_fatal() {
        for bad in [2.5, -3.0, 0.0] {
            let records = vec![defined(
                "hullparts",
                "container",
                Provenance::base(),
                vec![method("default", &[("energycells", bad)])],
            )];
            let err = merge(&records, &mut Diagnostics::new()).unwrap_err();
            assert!(
                matches!(err, CatalogueError::InvalidQuantity { value, .. } if value == bad),
                "{bad}"
            );
        }
    }

    #[test]
    fn float_spelled_integers_are_accepted() {
        let records = vec![defined(
            "hullparts",
            "container",
            Provenance::base(),
            vec![method("default", &[("energycells", 80.0)])],
        )];
        let catalogue = merge(&records, &mut Diagnostics::new()).unwrap();
        assert_eq!(
            catalogue.get("hullparts").unwrap().production_methods["default"].resources["energycells"],
            80
        );
    }

    #[test]
    fn repeated_definition_in_one_dataset_is_fatal() {
        let mut records = sample();
        records.push(defined("energycells", "container", Provenance::base(), vec![]));
        assert!(matches!(
            merge(&records, &mut Diagnostics::new()),
            Err(CatalogueError::DuplicateWare { ref ware_id, .. }) if ware_id == "energycells"
        ));
    }

    // --- Recoverable ---

    #[test]
    fn injection_into_unknown_ware_is_a_warning() {
        let mut records = sample();
        records.push(injected(
            "ship_xen_l_destroyer_01_a",
            split(),
            vec![method("default", &[("energycells", 1.0)])],
        ));
        let mut diag = Diagnostics::new();
        let catalogue = merge(&records, &mut diag).unwrap();
        assert!(!catalogue.exists("ship_xen_l_destroyer_01_a"));
        assert_eq!(diag.count(IssueKind::UnknownWare), 1);
        assert_eq!(diag.issues()[0].provenance, "ego_dlc_split");
    }
}
