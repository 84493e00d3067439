//! SQLite persistence for a finished build
//!
//! A build is written once, replacing everything from the previous build.
//! The query side is read-only and never re-derives anything from source
//! documents.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::Result;
use crate::models::{EquipmentRow, HullRow, SlotCategory, SizeClass};
use crate::pipeline::Build;

/// Open (or create) the database and make sure the schema exists.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Canonical catalogue
        CREATE TABLE IF NOT EXISTS wares (
            id TEXT PRIMARY KEY,
            transport TEXT NOT NULL,
            name TEXT,
            ware_group TEXT,
            volume INTEGER,
            component TEXT,
            licence TEXT,
            price_min INTEGER,
            price_avg INTEGER,
            price_max INTEGER,
            defined_in TEXT NOT NULL,
            buildable INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS production_methods (
            ware_id TEXT NOT NULL,
            method TEXT NOT NULL,
            time_s REAL NOT NULL,
            amount INTEGER NOT NULL,
            name TEXT,
            provenance TEXT NOT NULL,
            PRIMARY KEY (ware_id, method)
        );

        CREATE TABLE IF NOT EXISTS method_resources (
            ware_id TEXT NOT NULL,
            method TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            amount INTEGER NOT NULL,
            PRIMARY KEY (ware_id, method, resource_id)
        );

        -- Hull join
        CREATE TABLE IF NOT EXISTS hull_matches (
            archetype_id TEXT PRIMARY KEY,
            macro_id TEXT
        );

        CREATE TABLE IF NOT EXISTS match_issues (
            archetype_id TEXT PRIMARY KEY,
            provenance TEXT NOT NULL,
            reason TEXT NOT NULL,
            tied TEXT
        );

        CREATE TABLE IF NOT EXISTS hulls (
            archetype_id TEXT PRIMARY KEY,
            macro_id TEXT NOT NULL,
            ware_id TEXT,
            provenance TEXT NOT NULL,
            hull_name TEXT NOT NULL,
            race TEXT NOT NULL,
            size TEXT NOT NULL,
            role TEXT NOT NULL,
            variant TEXT NOT NULL,
            crew INTEGER,
            hull_hp INTEGER,
            engines INTEGER NOT NULL,
            shields INTEGER NOT NULL,
            weapons INTEGER NOT NULL,
            turrets_m INTEGER NOT NULL,
            turrets_l INTEGER NOT NULL,
            price_avg INTEGER,
            build_time_s REAL,
            resources TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS equipment (
            category TEXT NOT NULL,
            equipment_id TEXT NOT NULL,
            ware_id TEXT NOT NULL,
            name TEXT NOT NULL,
            provenance TEXT NOT NULL,
            race TEXT NOT NULL,
            size TEXT,
            mark TEXT,
            price_avg INTEGER,
            build_time_s REAL,
            resources TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY (category, equipment_id)
        );

        CREATE INDEX IF NOT EXISTS idx_wares_transport ON wares(transport);
        CREATE INDEX IF NOT EXISTS idx_method_resources_ware ON method_resources(ware_id, method);
        "#,
    )?;
    Ok(())
}

/// Remove everything written by a previous build.
pub fn clear_build(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM equipment;
        DELETE FROM hulls;
        DELETE FROM match_issues;
        DELETE FROM hull_matches;
        DELETE FROM method_resources;
        DELETE FROM production_methods;
        DELETE FROM wares;
        "#,
    )?;
    Ok(())
}

/// Replace the stored build with `build` in a single transaction.
pub fn write_build(conn: &mut Connection, build: &Build) -> Result<()> {
    let tx = conn.transaction()?;
    clear_build(&tx)?;

    for (id, ware) in build.catalogue.iter() {
        tx.execute(
            "INSERT INTO wares (id, transport, name, ware_group, volume, component, licence,
                                price_min, price_avg, price_max, defined_in, buildable)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                id,
                ware.transport,
                ware.details.name,
                ware.details.group,
                ware.details.volume,
                ware.details.component,
                ware.details.licence,
                ware.price.map(|p| p.min),
                ware.price.map(|p| p.average),
                ware.price.map(|p| p.max),
                ware.defined_in.to_string(),
                ware.is_buildable(),
            ],
        )?;

        for (method, production) in &ware.production_methods {
            tx.execute(
                "INSERT INTO production_methods (ware_id, method, time_s, amount, name, provenance)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    method,
                    production.time,
                    production.amount,
                    production.name,
                    production.provenance.to_string(),
                ],
            )?;
            for (resource, amount) in &production.resources {
                tx.execute(
                    "INSERT INTO method_resources (ware_id, method, resource_id, amount)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![id, method, resource, amount],
                )?;
            }
        }
    }

    for (archetype_id, macro_id) in &build.matches.matches {
        tx.execute(
            "INSERT INTO hull_matches (archetype_id, macro_id) VALUES (?1, ?2)",
            params![archetype_id, macro_id],
        )?;
    }

    for issue in &build.matches.report.issues {
        let tied = (!issue.tied.is_empty()).then(|| issue.tied.join(", "));
        tx.execute(
            "INSERT INTO match_issues (archetype_id, provenance, reason, tied)
             VALUES (?1, ?2, ?3, ?4)",
            params![issue.archetype_id, issue.provenance, issue.reason.as_str(), tied],
        )?;
    }

    for (i, hull) in build.hulls.iter().enumerate() {
        insert_hull(&tx, hull, i)?;
    }
    for (i, item) in build.equipment.iter().enumerate() {
        insert_equipment(&tx, item, i)?;
    }

    tx.commit()?;
    Ok(())
}

fn insert_hull(conn: &Connection, hull: &HullRow, sort_order: usize) -> Result<()> {
    conn.execute(
        "INSERT INTO hulls (archetype_id, macro_id, ware_id, provenance, hull_name, race, size, role,
                            variant, crew, hull_hp, engines, shields, weapons, turrets_m, turrets_l,
                            price_avg, build_time_s, resources, sort_order)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        params![
            hull.archetype_id,
            hull.macro_id,
            hull.ware_id,
            hull.provenance.to_string(),
            hull.hull_name,
            hull.race,
            hull.size.as_str(),
            hull.role,
            hull.variant,
            hull.crew,
            hull.hull_hp,
            hull.slots.total(SlotCategory::Engine),
            hull.slots.total(SlotCategory::Shield),
            hull.slots.total(SlotCategory::Weapon),
            hull.slots.sized(SlotCategory::Turret, SizeClass::M),
            hull.slots.sized(SlotCategory::Turret, SizeClass::L),
            hull.price.map(|p| p.average),
            hull.build_time,
            serde_json::to_string(&hull.resources)?,
            sort_order as i64,
        ],
    )?;
    Ok(())
}

fn insert_equipment(conn: &Connection, item: &EquipmentRow, sort_order: usize) -> Result<()> {
    conn.execute(
        "INSERT INTO equipment (category, equipment_id, ware_id, name, provenance, race, size, mark,
                                price_avg, build_time_s, resources, sort_order)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            item.category.as_str(),
            item.equipment_id,
            item.ware_id,
            item.name,
            item.provenance.to_string(),
            item.race,
            item.size.map(|s| s.as_str()),
            item.mark,
            item.price.map(|p| p.average),
            item.build_time,
            serde_json::to_string(&item.resources)?,
            sort_order as i64,
        ],
    )?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct WareSummary {
    pub id: String,
    pub transport: String,
    pub name: Option<String>,
    pub defined_in: String,
    pub buildable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMethod {
    pub method: String,
    pub time_s: f64,
    pub amount: u32,
    pub provenance: String,
    pub resources: Vec<(String, u32)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WareDetail {
    pub summary: WareSummary,
    pub price: Option<(i64, i64, i64)>,
    pub component: Option<String>,
    pub methods: Vec<StoredMethod>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredHull {
    pub archetype_id: String,
    pub macro_id: String,
    pub ware_id: Option<String>,
    pub race: String,
    pub size: String,
    pub role: String,
    pub variant: String,
    pub hull_hp: Option<u32>,
    pub crew: Option<u32>,
    pub engines: u32,
    pub shields: u32,
    pub weapons: u32,
    pub turrets_m: u32,
    pub turrets_l: u32,
    pub build_time_s: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEquipment {
    pub category: String,
    pub equipment_id: String,
    pub name: String,
    pub race: String,
    pub size: Option<String>,
    pub mark: Option<String>,
    pub price_avg: Option<i64>,
    pub build_time_s: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredIssue {
    pub archetype_id: String,
    pub provenance: String,
    pub reason: String,
    pub tied: Option<String>,
}

fn summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WareSummary> {
    Ok(WareSummary {
        id: row.get(0)?,
        transport: row.get(1)?,
        name: row.get(2)?,
        defined_in: row.get(3)?,
        buildable: row.get(4)?,
    })
}

/// Wares by id, optionally only buildable ones or one transport.
pub fn list_wares(
    conn: &Connection,
    buildable_only: bool,
    transport: Option<&str>,
) -> Result<Vec<WareSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, transport, name, defined_in, buildable
         FROM wares
         WHERE (?1 = 0 OR buildable = 1)
           AND (?2 IS NULL OR transport = ?2)
         ORDER BY id",
    )?;

    let rows = stmt.query_map(params![buildable_only, transport], summary_from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

fn method_resources(conn: &Connection, ware_id: &str, method: &str) -> Result<Vec<(String, u32)>> {
    let mut stmt = conn.prepare(
        "SELECT resource_id, amount FROM method_resources
         WHERE ware_id = ?1 AND method = ?2
         ORDER BY resource_id",
    )?;
    let rows = stmt.query_map([ware_id, method], |row| Ok((row.get(0)?, row.get(1)?)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// One ware with its methods and their resources.
pub fn get_ware(conn: &Connection, ware_id: &str) -> Result<Option<WareDetail>> {
    let found = conn
        .query_row(
            "SELECT id, transport, name, defined_in, buildable, price_min, price_avg, price_max, component
             FROM wares WHERE id = ?1",
            [ware_id],
            |row| {
                let summary = summary_from_row(row)?;
                let price = match (
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, Option<i64>>(6)?,
                    row.get::<_, Option<i64>>(7)?,
                ) {
                    (Some(min), Some(avg), Some(max)) => Some((min, avg, max)),
                    _ => None,
                };
                Ok((summary, price, row.get::<_, Option<String>>(8)?))
            },
        )
        .optional()?;

    let Some((summary, price, component)) = found else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT method, time_s, amount, provenance FROM production_methods
         WHERE ware_id = ?1 ORDER BY method",
    )?;
    let rows = stmt.query_map([ware_id], |row| {
        Ok(StoredMethod {
            method: row.get(0)?,
            time_s: row.get(1)?,
            amount: row.get(2)?,
            provenance: row.get(3)?,
            resources: Vec::new(),
        })
    })?;

    let mut methods = Vec::new();
    for row in rows {
        let mut method = row?;
        method.resources = method_resources(conn, ware_id, &method.method)?;
        methods.push(method);
    }

    Ok(Some(WareDetail {
        summary,
        price,
        component,
        methods,
    }))
}

/// Hull rows in assembly order.
pub fn list_hulls(conn: &Connection) -> Result<Vec<StoredHull>> {
    let mut stmt = conn.prepare(
        "SELECT archetype_id, macro_id, ware_id, race, size, role, variant, hull_hp, crew,
                engines, shields, weapons, turrets_m, turrets_l, build_time_s
         FROM hulls ORDER BY sort_order",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(StoredHull {
            archetype_id: row.get(0)?,
            macro_id: row.get(1)?,
            ware_id: row.get(2)?,
            race: row.get(3)?,
            size: row.get(4)?,
            role: row.get(5)?,
            variant: row.get(6)?,
            hull_hp: row.get(7)?,
            crew: row.get(8)?,
            engines: row.get(9)?,
            shields: row.get(10)?,
            weapons: row.get(11)?,
            turrets_m: row.get(12)?,
            turrets_l: row.get(13)?,
            build_time_s: row.get(14)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

pub fn list_equipment(conn: &Connection) -> Result<Vec<StoredEquipment>> {
    let mut stmt = conn.prepare(
        "SELECT category, equipment_id, name, race, size, mark, price_avg, build_time_s
         FROM equipment ORDER BY sort_order",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(StoredEquipment {
            category: row.get(0)?,
            equipment_id: row.get(1)?,
            name: row.get(2)?,
            race: row.get(3)?,
            size: row.get(4)?,
            mark: row.get(5)?,
            price_avg: row.get(6)?,
            build_time_s: row.get(7)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Archetypes left without a hull by the last build.
pub fn list_match_issues(conn: &Connection) -> Result<Vec<StoredIssue>> {
    let mut stmt = conn.prepare(
        "SELECT archetype_id, provenance, reason, tied FROM match_issues ORDER BY archetype_id",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(StoredIssue {
            archetype_id: row.get(0)?,
            provenance: row.get(1)?,
            reason: row.get(2)?,
            tied: row.get(3)?,
        })
    })?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Stored archetype to macro join; `Some(None)` for an unmatched archetype.
pub fn get_match(conn: &Connection, archetype_id: &str) -> Result<Option<Option<String>>> {
    let found = conn
        .query_row(
            "SELECT macro_id FROM hull_matches WHERE archetype_id = ?1",
            [archetype_id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(found)
}
