//! Versioned schema migrations: migrate, clean and baseline.
//!
//! A [`MigrationSet`] is an ordered collection of versioned SQL scripts plus
//! the name of the history table that records what has been applied. Each
//! operation is exposed as a value-comparable [`Step`] whose descriptor is a
//! field-by-field snapshot of the set at the time the step is created, so
//! later changes to a builder never alter an existing cache key.

use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{PreparationStep, Step, StepDescriptor};
use crate::constants::DEFAULT_HISTORY_TABLE;
use crate::errors::PreparationError;

/// A single versioned migration script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    version: u32,
    description: String,
    sql: String,
}

impl Migration {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Content checksum (blake3, hex).
    pub fn checksum(&self) -> String {
        blake3::hash(self.sql.as_bytes()).to_hex().to_string()
    }
}

/// An ordered set of migrations sharing one history table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSet {
    table: String,
    migrations: BTreeMap<u32, Migration>,
}

impl MigrationSet {
    pub fn builder() -> MigrationSetBuilder {
        MigrationSetBuilder {
            table: DEFAULT_HISTORY_TABLE.to_string(),
            migrations: BTreeMap::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn latest_version(&self) -> Option<u32> {
        self.migrations.keys().next_back().copied()
    }

    pub fn migrations(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.values()
    }

    /// Apply every pending migration.
    pub fn migrate(&self) -> Step {
        Step::new(MigrateStep {
            set: self.clone(),
            target: None,
        })
    }

    /// Apply pending migrations up to and including `target`.
    pub fn migrate_to(&self, target: u32) -> Step {
        Step::new(MigrateStep {
            set: self.clone(),
            target: Some(target),
        })
    }

    /// Drop every user object, including the history table.
    pub fn clean(&self) -> Step {
        Step::new(CleanStep)
    }

    /// Mark the schema as already at `version` without running scripts.
    pub fn baseline(&self, version: u32) -> Step {
        Step::new(BaselineStep {
            table: self.table.clone(),
            version,
        })
    }
}

/// Builder for [`MigrationSet`].
#[derive(Debug, Clone)]
pub struct MigrationSetBuilder {
    table: String,
    migrations: BTreeMap<u32, Migration>,
}

impl MigrationSetBuilder {
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Add a migration. A later script with the same version replaces the earlier one.
    pub fn migration(
        mut self,
        version: u32,
        description: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        self.migrations.insert(
            version,
            Migration {
                version,
                description: description.into(),
                sql: sql.into(),
            },
        );
        self
    }

    pub fn build(self) -> MigrationSet {
        MigrationSet {
            table: self.table,
            migrations: self.migrations,
        }
    }
}

/// Highest version recorded in the history table, or `None` if the table is
/// missing or empty.
pub fn applied_version(conn: &Connection, table: &str) -> Result<Option<u32>, rusqlite::Error> {
    if !table_exists(conn, table)? {
        return Ok(None);
    }
    conn.query_row(
        &format!("SELECT MAX(version) FROM {}", quote_ident(table)),
        [],
        |row| row.get::<_, Option<u32>>(0),
    )
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

fn ensure_history_table(conn: &Connection, table: &str) -> Result<(), rusqlite::Error> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            checksum TEXT NOT NULL,
            kind TEXT NOT NULL,
            installed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        quote_ident(table)
    ))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[derive(Debug)]
struct MigrateStep {
    set: MigrationSet,
    target: Option<u32>,
}

impl PreparationStep for MigrateStep {
    fn apply(&self, conn: &Connection) -> Result<(), PreparationError> {
        let table = self.set.table.as_str();
        ensure_history_table(conn, table).map_err(|e| PreparationError::sql("migrate", e))?;
        let current = applied_version(conn, table)
            .map_err(|e| PreparationError::sql("migrate", e))?
            .unwrap_or(0);
        let target = self.target.unwrap_or(u32::MAX);
        if current >= target {
            return Ok(());
        }

        for migration in self.set.migrations.range(current + 1..=target).map(|(_, m)| m) {
            let fail = |source| PreparationError::Migration {
                version: migration.version,
                description: migration.description.clone(),
                source,
            };
            let tx = conn.unchecked_transaction().map_err(fail)?;
            tx.execute_batch(&migration.sql).map_err(fail)?;
            tx.execute(
                &format!(
                    "INSERT INTO {} (version, description, checksum, kind) VALUES (?1, ?2, ?3, 'migration')",
                    quote_ident(table)
                ),
                params![migration.version, migration.description, migration.checksum()],
            )
            .map_err(fail)?;
            tx.commit().map_err(fail)?;
            debug!(version = migration.version, description = %migration.description, "applied migration");
        }
        Ok(())
    }

    fn descriptor(&self) -> Option<StepDescriptor> {
        let scripts: Vec<String> = self
            .set
            .migrations
            .values()
            .map(|m| format!("{}:{}", m.version, m.checksum()))
            .collect();
        Some(
            StepDescriptor::builder("migrate")
                .param("table", &self.set.table)
                .opt_param("target", self.target)
                .param("scripts", scripts.join(","))
                .build(),
        )
    }
}

#[derive(Debug)]
struct CleanStep;

impl PreparationStep for CleanStep {
    fn apply(&self, conn: &Connection) -> Result<(), PreparationError> {
        let err = |e| PreparationError::sql("clean", e);
        let foreign_keys: bool = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .map_err(err)?;
        if foreign_keys {
            conn.pragma_update(None, "foreign_keys", false).map_err(err)?;
        }

        let objects = {
            let mut stmt = conn
                .prepare(
                    "SELECT type, name FROM sqlite_master
                     WHERE type IN ('trigger', 'view', 'table') AND name NOT LIKE 'sqlite_%'
                     ORDER BY CASE type WHEN 'trigger' THEN 0 WHEN 'view' THEN 1 ELSE 2 END",
                )
                .map_err(err)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
                .map_err(err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(err)?
        };

        let dropped = objects.len();
        let result = objects.iter().try_for_each(|(kind, name)| {
            conn.execute_batch(&format!(
                "DROP {} IF EXISTS {}",
                kind.to_uppercase(),
                quote_ident(name)
            ))
        });

        if foreign_keys {
            conn.pragma_update(None, "foreign_keys", true).map_err(err)?;
        }
        result.map_err(err)?;
        debug!(dropped, "cleaned schema");
        Ok(())
    }

    fn descriptor(&self) -> Option<StepDescriptor> {
        Some(StepDescriptor::builder("clean").build())
    }
}

#[derive(Debug)]
struct BaselineStep {
    table: String,
    version: u32,
}

impl PreparationStep for BaselineStep {
    fn apply(&self, conn: &Connection) -> Result<(), PreparationError> {
        let err = |e| PreparationError::sql("baseline", e);
        ensure_history_table(conn, &self.table).map_err(err)?;
        if applied_version(conn, &self.table).map_err(err)?.is_some() {
            return Err(PreparationError::BaselineRejected {
                table: self.table.clone(),
                version: self.version,
            });
        }
        conn.execute(
            &format!(
                "INSERT INTO {} (version, description, checksum, kind) VALUES (?1, '<< baseline >>', '', 'baseline')",
                quote_ident(&self.table)
            ),
            [self.version],
        )
        .map_err(err)?;
        Ok(())
    }

    fn descriptor(&self) -> Option<StepDescriptor> {
        Some(
            StepDescriptor::builder("baseline")
                .param("table", &self.table)
                .param("version", self.version)
                .build(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preparer::CompositePreparer;

    fn users_set() -> MigrationSet {
        MigrationSet::builder()
            .migration(1, "create users", "CREATE TABLE users (id INTEGER PRIMARY KEY)")
            .migration(2, "add name", "ALTER TABLE users ADD COLUMN name TEXT")
            .migration(3, "create posts", "CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES users(id))")
            .build()
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        let names = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        names
    }

    #[test]
    fn migrate_applies_all_versions_in_order() {
        let conn = Connection::open_in_memory().unwrap();
        users_set().migrate().apply(&conn).unwrap();
        assert_eq!(applied_version(&conn, DEFAULT_HISTORY_TABLE).unwrap(), Some(3));
        assert!(table_names(&conn).contains(&"posts".to_string()));
    }

    #[test]
    fn migrate_to_stops_at_target_and_resumes() {
        let conn = Connection::open_in_memory().unwrap();
        let set = users_set();
        set.migrate_to(1).apply(&conn).unwrap();
        assert_eq!(applied_version(&conn, DEFAULT_HISTORY_TABLE).unwrap(), Some(1));
        set.migrate().apply(&conn).unwrap();
        assert_eq!(applied_version(&conn, DEFAULT_HISTORY_TABLE).unwrap(), Some(3));
    }

    #[test]
    fn failing_script_reports_version_and_rolls_back() {
        let conn = Connection::open_in_memory().unwrap();
        let set = MigrationSet::builder()
            .migration(1, "ok", "CREATE TABLE a (id INTEGER)")
            .migration(2, "broken", "CREATE TABLE b (id INTEGER); NOT SQL")
            .build();
        let err = set.migrate().apply(&conn).unwrap_err();
        assert!(matches!(err, PreparationError::Migration { version: 2, .. }));
        assert_eq!(applied_version(&conn, DEFAULT_HISTORY_TABLE).unwrap(), Some(1));
        assert!(!table_names(&conn).contains(&"b".to_string()));
    }

    #[test]
    fn clean_drops_everything() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", true).unwrap();
        let set = users_set();
        CompositePreparer::new([set.migrate(), set.clean()])
            .apply(&conn)
            .unwrap();
        assert!(table_names(&conn).is_empty());
        let fk: bool = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert!(fk);
    }

    #[test]
    fn baseline_skips_earlier_versions() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        let set = users_set();
        CompositePreparer::new([set.baseline(2), set.migrate()])
            .apply(&conn)
            .unwrap();
        assert_eq!(applied_version(&conn, DEFAULT_HISTORY_TABLE).unwrap(), Some(3));
    }

    #[test]
    fn baseline_rejected_on_existing_history() {
        let conn = Connection::open_in_memory().unwrap();
        let set = users_set();
        set.migrate().apply(&conn).unwrap();
        let err = set.baseline(1).apply(&conn).unwrap_err();
        assert!(matches!(err, PreparationError::BaselineRejected { version: 1, .. }));
    }

    #[test]
    fn descriptors_snapshot_set_contents() {
        assert_eq!(users_set().migrate(), users_set().migrate());
        assert_ne!(users_set().migrate(), users_set().migrate_to(2));

        let extended = MigrationSet::builder()
            .migration(1, "create users", "CREATE TABLE users (id INTEGER PRIMARY KEY)")
            .build();
        assert_ne!(users_set().migrate(), extended.migrate());
    }
}
