use std::fs;
use std::path::Path;

use tempfile::TempDir;

use x4_catalogue::diagnostics::IssueKind;
use x4_catalogue::matcher::MatchReason;
use x4_catalogue::models::{SizeClass, SlotCategory};
use x4_catalogue::{BuildConfig, CatalogueError, build, build_catalogue, store};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

const BASE_WARES: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<wares>
  <ware id="energycells" name="{20201,701}" group="energy" transport="container" volume="6" tags="container economy">
    <price min="10" average="16" max="22"/>
    <production time="60" amount="175" method="default" name="{20206,101}">
      <primary/>
    </production>
  </ware>
  <ware id="hullparts" group="hightech" transport="container" volume="10">
    <price min="150" average="200" max="250"/>
    <production time="240" amount="100" method="default">
      <primary>
        <ware ware="energycells" amount="80"/>
      </primary>
    </production>
  </ware>
  <ware id="ship_arg_s_fighter_01_a" name="{20101,10101}" group="ships_argon" transport="ship" tags="ship">
    <price min="90000" average="100000" max="110000"/>
    <production time="60" amount="1" method="default">
      <primary>
        <ware ware="energycells" amount="30"/>
        <ware ware="hullparts" amount="40"/>
      </primary>
    </production>
    <component ref="ship_arg_s_fighter_01_a_macro"/>
    <owner faction="argon"/>
  </ware>
  <ware id="ship_arg_l_destroyer_01_a" group="ships_argon" transport="ship" tags="ship">
    <price min="4000000" average="5000000" max="6000000"/>
    <production time="900" amount="1" method="default">
      <primary>
        <ware ware="energycells" amount="1500"/>
        <ware ware="hullparts" amount="2000"/>
      </primary>
    </production>
    <component ref="ship_arg_l_destroyer_01_a_macro"/>
    <restriction licence="capitalship"/>
  </ware>
  <ware id="engine_arg_s_allround_01_mk1" group="engines" transport="equipment" tags="equipment">
    <price min="5000" average="6000" max="7000"/>
    <production time="10" amount="1" method="default">
      <primary>
        <ware ware="energycells" amount="10"/>
      </primary>
    </production>
  </ware>
  <ware transport="container"/>
</wares>"#;

const BASE_SHIPS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<ships>
  <ship id="argon_fighter_s" group="arg_fighter_s">
    <category tags="[military, fighter]" faction="[argon, antigone]" size="ship_s"/>
  </ship>
  <ship id="argon_destroyer_l" group="arg_destroyer_l">
    <category tags="[military, destroyer]" faction="[argon]" size="ship_l"/>
  </ship>
  <ship id="masstraffic_gen_s_courier" group="masstraffic">
    <category tags="[civilian]" faction="[ownerless]" size="ship_s"/>
  </ship>
</ships>"#;

const FIGHTER_MACRO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<macros>
  <macro name="ship_arg_s_fighter_01_a_macro" class="ship_s">
    <component ref="ship_arg_s_fighter_01"/>
    <properties>
      <identification name="{20101,10102}" makerrace="argon"/>
      <hull max="3000"/>
      <people capacity="1"/>
    </properties>
  </macro>
</macros>"#;

const FIGHTER_COMPONENT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<components>
  <component name="ship_arg_s_fighter_01" class="ship_s">
    <connections>
      <connection name="con_engine_01" tags="engine small"/>
      <connection name="con_shieldgen_s_01" tags="shield small"/>
      <connection name="con_weapon_01" tags="weapon small"/>
      <connection name="con_weapon_02" tags="weapon small"/>
      <connection name="con_cockpit" tags="cockpit"/>
    </connections>
  </component>
</components>"#;

const DESTROYER_MACRO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<macros>
  <macro name="ship_arg_l_destroyer_01_a_macro" class="ship_l">
    <component ref="ship_arg_l_destroyer_01"/>
    <properties>
      <hull max="93000"/>
      <people capacity="56"/>
    </properties>
  </macro>
</macros>"#;

const MASSTRAFFIC_MACRO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<macros>
  <macro name="ship_gen_s_masstraffic_courier_01_a_macro" class="ship_s"/>
</macros>"#;

const TERRAN_WARES: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<diff>
  <add sel="/wares/ware[@id='ship_arg_l_destroyer_01_a']">
    <production time="800" amount="1" method="terran">
      <primary>
        <ware ware="energycells" amount="1000"/>
      </primary>
    </production>
  </add>
  <add sel="/wares/ware[@id='ship_ter_l_destroyer_01_a']">
    <production time="800" amount="1" method="default">
      <primary>
        <ware ware="energycells" amount="1000"/>
      </primary>
    </production>
  </add>
</diff>"#;

const SPLIT_WARES: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<diff>
  <add sel="/wares">
    <ware id="ship_spl_s_fighter_01_a" group="ships_split" transport="ship">
      <production time="50" amount="1" method="default">
        <primary>
          <ware ware="hullparts" amount="35"/>
        </primary>
      </production>
      <component ref="ship_spl_s_fighter_01_a_macro"/>
    </ware>
  </add>
</diff>"#;

const SPLIT_SHIPS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<diff>
  <add sel="/ships">
    <ship id="boron_whale_xl" group="bor_whale_xl">
      <category tags="[military, carrier]" faction="[boron]" size="ship_xl"/>
    </ship>
  </add>
</diff>"#;

fn game_tree() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "libraries/wares.xml", BASE_WARES);
    write(root, "libraries/ships.xml", BASE_SHIPS);
    write(
        root,
        "assets/units/size_s/macros/ship_arg_s_fighter_01_a_macro.xml",
        FIGHTER_MACRO,
    );
    write(root, "assets/units/size_s/ship_arg_s_fighter_01.xml", FIGHTER_COMPONENT);
    write(
        root,
        "assets/units/size_s/macros/ship_gen_s_masstraffic_courier_01_a_macro.xml",
        MASSTRAFFIC_MACRO,
    );
    write(
        root,
        "assets/units/size_l/macros/ship_arg_l_destroyer_01_a_macro.xml",
        DESTROYER_MACRO,
    );
    write(root, "extensions/ego_dlc_terran/libraries/wares.xml", TERRAN_WARES);
    write(root, "extensions/ego_dlc_split/libraries/wares.xml", SPLIT_WARES);
    write(root, "extensions/ego_dlc_split/libraries/ships.xml", SPLIT_SHIPS);
    dir
}

// --- Full build ---

#[test]
fn builds_catalogue_from_base_and_extensions() {
    let dir = game_tree();
    let result = build(dir.path(), &BuildConfig::default()).unwrap();

    let catalogue = &result.catalogue;
    assert_eq!(catalogue.len(), 6);
    assert!(catalogue.exists("ship_spl_s_fighter_01_a"));
    assert!(!catalogue.exists("ship_ter_l_destroyer_01_a"));

    let destroyer = catalogue.get("ship_arg_l_destroyer_01_a").unwrap();
    let methods: Vec<&str> = destroyer
        .production_methods
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(methods, vec!["default", "terran"]);
    assert_eq!(destroyer.production_methods["terran"].provenance.name(), "ego_dlc_terran");

    // one ware without id, one injection into an unknown ware
    assert_eq!(result.diagnostics.count(IssueKind::Structural), 1);
    assert_eq!(result.diagnostics.count(IssueKind::UnknownWare), 1);
}

#[test]
fn method_without_resources_still_makes_a_ware_buildable() {
    let dir = game_tree();
    let result = build(dir.path(), &BuildConfig::default()).unwrap();
    let cells = result.catalogue.get("energycells").unwrap();
    assert!(cells.is_buildable());
    assert!(cells.production_methods["default"].resources.is_empty());
    assert_eq!(cells.details.tags, vec!["container", "economy"]);
}

#[test]
fn matches_archetypes_to_hulls() {
    let dir = game_tree();
    let result = build(dir.path(), &BuildConfig::default()).unwrap();

    let matches = &result.matches.matches;
    assert_eq!(
        matches["argon_fighter_s"].as_deref(),
        Some("ship_arg_s_fighter_01_a_macro")
    );
    assert_eq!(
        matches["argon_destroyer_l"].as_deref(),
        Some("ship_arg_l_destroyer_01_a_macro")
    );
    assert_eq!(matches["boron_whale_xl"], None);
    assert!(!matches.contains_key("masstraffic_gen_s_courier"));

    let report = &result.matches.report;
    assert_eq!(report.matched, 2);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].archetype_id, "boron_whale_xl");
    assert_eq!(report.issues[0].reason, MatchReason::NoCandidates);
    assert_eq!(report.issues[0].provenance, "ego_dlc_split");

    // the destroyer macro points at a component file that does not exist
    assert_eq!(result.diagnostics.count(IssueKind::MissingComponent), 1);
}

#[test]
fn hull_rows_carry_slots_and_production() {
    let dir = game_tree();
    let result = build(dir.path(), &BuildConfig::default()).unwrap();

    let fighter = result
        .hulls
        .iter()
        .find(|h| h.archetype_id == "argon_fighter_s")
        .unwrap();
    assert_eq!(fighter.size, SizeClass::S);
    assert_eq!(fighter.hull_hp, Some(3000));
    assert_eq!(fighter.crew, Some(1));
    assert_eq!(fighter.hull_name, "{20101,10102}");
    assert_eq!(fighter.race, "ARG");
    assert_eq!(fighter.role, "fighter");
    assert_eq!(fighter.variant, "Vanguard");
    assert_eq!(fighter.slots.total(SlotCategory::Engine), 1);
    assert_eq!(fighter.slots.total(SlotCategory::Shield), 1);
    assert_eq!(fighter.slots.total(SlotCategory::Weapon), 2);
    assert_eq!(fighter.ware_id.as_deref(), Some("ship_arg_s_fighter_01_a"));
    assert_eq!(fighter.price.unwrap().average, 100_000);
    assert_eq!(fighter.resources["hullparts"], 40);

    let destroyer = result
        .hulls
        .iter()
        .find(|h| h.archetype_id == "argon_destroyer_l")
        .unwrap();
    assert_eq!(destroyer.build_time, Some(900.0));
    assert!(destroyer.slots.is_empty());

    assert_eq!(result.equipment.len(), 1);
    assert_eq!(result.equipment[0].equipment_id, "engine_arg_s_allround_mk1");
}

// --- Determinism and precedence ---

#[test]
fn repeated_builds_are_identical() {
    let dir = game_tree();
    let config = BuildConfig::default();
    let first = build(dir.path(), &config).unwrap();
    let second = build(dir.path(), &config).unwrap();

    assert_eq!(
        first.catalogue.to_json().unwrap(),
        second.catalogue.to_json().unwrap()
    );
    assert_eq!(first.matches.matches, second.matches.matches);
    assert_eq!(first.hulls, second.hulls);
}

#[test]
fn conflicting_extensions_fail_the_build() {
    let dir = game_tree();
    write(
        dir.path(),
        "extensions/ego_dlc_boron/libraries/wares.xml",
        r#"<diff>
  <add sel="/wares/ware[@id='ship_arg_l_destroyer_01_a']">
    <production time="700" amount="1" method="terran">
      <primary><ware ware="hullparts" amount="100"/></primary>
    </production>
  </add>
</diff>"#,
    );

    let err = build(dir.path(), &BuildConfig::default()).unwrap_err();
    match err {
        CatalogueError::MergeConflict {
            ware_id,
            method,
            first,
            second,
        } => {
            assert_eq!(ware_id, "ship_arg_l_destroyer_01_a");
            assert_eq!(method, "terran");
            assert_eq!(first, "ego_dlc_boron");
            assert_eq!(second, "ego_dlc_terran");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn declared_order_decides_which_provenance_is_first() {
    let dir = game_tree();
    write(
        dir.path(),
        "extensions/ego_dlc_boron/libraries/wares.xml",
        r#"<diff>
  <add sel="/wares/ware[@id='ship_arg_l_destroyer_01_a']">
    <production time="700" amount="1" method="terran">
      <primary><ware ware="hullparts" amount="100"/></primary>
    </production>
  </add>
</diff>"#,
    );
    let config = BuildConfig {
        extension_order: vec!["ego_dlc_terran".to_string()],
        ..BuildConfig::default()
    };
    let err = build(dir.path(), &config).unwrap_err();
    assert!(matches!(
        err,
        CatalogueError::MergeConflict { ref first, ref second, .. }
            if first == "ego_dlc_terran" && second == "ego_dlc_boron"
    ));
}

#[test]
fn base_only_ignores_extensions() {
    let dir = game_tree();
    let config = BuildConfig {
        extensions_enabled: false,
        ..BuildConfig::default()
    };
    let (catalogue, diagnostics) = build_catalogue(dir.path(), &config).unwrap();
    assert_eq!(catalogue.len(), 5);
    let destroyer = catalogue.get("ship_arg_l_destroyer_01_a").unwrap();
    assert_eq!(destroyer.production_methods.len(), 1);
    assert_eq!(diagnostics.count(IssueKind::UnknownWare), 0);
}

// --- Recoverable problems ---

#[test]
fn malformed_document_is_skipped() {
    let dir = game_tree();
    write(
        dir.path(),
        "assets/units/size_m/macros/broken_macro.xml",
        "<macros><macro name=\"ship_arg_m_broken_macro\" class=\"ship_m\"></macros>",
    );
    let result = build(dir.path(), &BuildConfig::default()).unwrap();
    let skipped: Vec<_> = result
        .diagnostics
        .issues()
        .iter()
        .filter(|i| i.context.ends_with("broken_macro.xml"))
        .collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].kind, IssueKind::Structural);
    assert_eq!(result.matches.report.matched, 2);
}

#[test]
fn non_utf8_document_is_skipped() {
    let dir = game_tree();
    let path = dir.path().join("assets/units/size_s/macros/odd_macro.xml");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(
        &path,
        b"<macros><macro name=\"ship_arg_s_caf\xe9_macro\" class=\"ship_s\"/></macros>",
    )
    .unwrap();

    let result = build(dir.path(), &BuildConfig::default()).unwrap();
    let skipped: Vec<_> = result
        .diagnostics
        .issues()
        .iter()
        .filter(|i| i.context.ends_with("odd_macro.xml"))
        .collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].kind, IssueKind::Structural);
    assert_eq!(result.catalogue.len(), 6);
}

#[test]
fn fractional_resource_is_fatal() {
    let dir = game_tree();
    write(
        dir.path(),
        "extensions/ego_dlc_split/libraries/wares.xml",
        r#"<diff>
  <add sel="/wares/ware[@id='hullparts']">
    <production time="10" amount="1" method="split">
      <primary><ware ware="energycells" amount="2.5"/></primary>
    </production>
  </add>
</diff>"#,
    );
    let err = build(dir.path(), &BuildConfig::default()).unwrap_err();
    assert!(matches!(err, CatalogueError::InvalidQuantity { ref ware_id, .. } if ware_id == "hullparts"));
}

// --- Persistence ---

#[test]
fn stored_build_answers_queries() {
    let dir = game_tree();
    let result = build(dir.path(), &BuildConfig::default()).unwrap();

    let db_path = dir.path().join("catalogue.db");
    let mut conn = store::open(&db_path).unwrap();
    store::write_build(&mut conn, &result).unwrap();
    drop(conn);

    let conn = store::open(&db_path).unwrap();
    let ships = store::list_wares(&conn, true, Some("ship")).unwrap();
    assert_eq!(ships.len(), 3);

    let destroyer = store::get_ware(&conn, "ship_arg_l_destroyer_01_a")
        .unwrap()
        .unwrap();
    let methods: Vec<(&str, &str)> = destroyer
        .methods
        .iter()
        .map(|m| (m.method.as_str(), m.provenance.as_str()))
        .collect();
    assert_eq!(
        methods,
        vec![("default", "base"), ("terran", "ego_dlc_terran")]
    );

    assert_eq!(store::list_hulls(&conn).unwrap().len(), 2);
    let issues = store::list_match_issues(&conn).unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].reason, "no_candidates");
}
