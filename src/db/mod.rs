use crate::errors::{AppError, AppResult};
use crate::models::{Classification, Link, Project, ProjectId, ProjectType, TrackerSettings};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = include_str!("schema.sql");

const PROJECT_COLUMNS: &str =
    "id, name, notes, links_json, types_json, legacy_type, completed, date_added, date_completed";

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.ensure_schema_extensions()?;
        db.ensure_default_settings()?;

        Ok(db)
    }

    pub fn list_projects(&self) -> AppResult<Vec<Project>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY date_added DESC, id DESC"
        ))?;
        let rows = statement.query_map([], parse_project_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn get_project(&self, id: ProjectId) -> AppResult<Option<Project>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            [id.0],
            parse_project_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    /// Stores the project under its client-assigned id.
    pub fn insert_project(&self, project: &Project) -> AppResult<ProjectId> {
        project.validate()?;
        let row = ProjectRow::from_project(project)?;

        let conn = self.lock()?;
        let exists = conn
            .query_row("SELECT 1 FROM projects WHERE id = ?1", [project.id.0], |_| Ok(()))
            .optional()?
            .is_some();
        if exists {
            return Err(AppError::Validation(format!(
                "Project {} already exists",
                project.id
            )));
        }

        conn.execute(
            "INSERT INTO projects (id, name, notes, links_json, types_json, legacy_type, completed, date_added, date_completed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                project.id.0,
                project.name,
                project.notes,
                row.links_json,
                row.types_json,
                row.legacy_type,
                project.completed,
                format_time(project.date_added),
                project.date_completed.map(format_time),
            ],
        )?;

        Ok(project.id)
    }

    /// Replaces every mutable column of `id`; `date_added` is kept as stored.
    pub fn update_project(&self, id: ProjectId, project: &Project) -> AppResult<()> {
        project.validate()?;
        let row = ProjectRow::from_project(project)?;

        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE projects
             SET name = ?1, notes = ?2, links_json = ?3, types_json = ?4, legacy_type = ?5,
                 completed = ?6, date_completed = ?7
             WHERE id = ?8",
            params![
                project.name,
                project.notes,
                row.links_json,
                row.types_json,
                row.legacy_type,
                project.completed,
                project.date_completed.map(format_time),
                id.0,
            ],
        )?;

        if changed == 0 {
            return Err(AppError::NotFound(format!("Project {} not found", id)));
        }
        Ok(())
    }

    pub fn delete_project(&self, id: ProjectId) -> AppResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM projects WHERE id = ?1", [id.0])?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("Project {} not found", id)));
        }
        Ok(())
    }

    pub fn get_settings(&self) -> AppResult<TrackerSettings> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = 'tracker'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(serde_json::from_str::<TrackerSettings>(&raw).unwrap_or_else(|error| {
                tracing::warn!(error = %error, "stored tracker settings are malformed; using defaults");
                TrackerSettings::default()
            })),
            None => Ok(TrackerSettings::default()),
        }
    }

    pub fn update_settings(&self, update: serde_json::Value) -> AppResult<TrackerSettings> {
        let current = self.get_settings()?;
        let mut merged = serde_json::to_value(current)?;
        merge_json(&mut merged, update);
        let settings: TrackerSettings = serde_json::from_value(merged)
            .map_err(|error| AppError::Validation(format!("Invalid settings: {}", error)))?;

        self.write_settings(&settings)?;
        Ok(settings)
    }

    fn write_settings(&self, settings: &TrackerSettings) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at)
             VALUES ('tracker', ?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![serde_json::to_string(settings)?, format_time(Utc::now())],
        )?;
        Ok(())
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        let exists = {
            let conn = self.lock()?;
            conn.query_row("SELECT 1 FROM settings WHERE key = 'tracker'", [], |_| Ok(()))
                .optional()?
                .is_some()
        };
        if !exists {
            self.write_settings(&TrackerSettings::default())?;
        }
        Ok(())
    }

    // Databases created before the tag set existed carry a single type per row.
    fn ensure_schema_extensions(&self) -> AppResult<()> {
        let conn = self.lock()?;
        if !column_exists(&conn, "projects", "legacy_type")? {
            conn.execute("ALTER TABLE projects ADD COLUMN legacy_type TEXT", [])?;
        }
        Ok(())
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }
}

struct ProjectRow {
    links_json: String,
    types_json: String,
    legacy_type: Option<&'static str>,
}

impl ProjectRow {
    fn from_project(project: &Project) -> AppResult<Self> {
        let (types, legacy_type) = match &project.classification {
            Classification::Tags(types) => (types.iter().copied().collect::<Vec<_>>(), None),
            Classification::Legacy(legacy) => (Vec::new(), Some(legacy.as_str())),
            Classification::Unclassified => (Vec::new(), None),
        };
        Ok(Self {
            links_json: serde_json::to_string(&project.links)?,
            types_json: serde_json::to_string(&types)?,
            legacy_type,
        })
    }
}

fn parse_project_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    let links: Vec<Link> = parse_json_column(3, &row.get::<_, String>(3)?)?;
    let types: BTreeSet<ProjectType> = parse_json_column(4, &row.get::<_, String>(4)?)?;
    let legacy = row
        .get::<_, Option<String>>(5)?
        .and_then(|raw| ProjectType::parse(&raw));

    Ok(Project {
        id: ProjectId(row.get(0)?),
        name: row.get(1)?,
        notes: row.get(2)?,
        links,
        classification: Classification::from_parts(Some(types), legacy),
        completed: row.get(6)?,
        date_added: parse_time(&row.get::<_, String>(7)?)?,
        date_completed: row
            .get::<_, Option<String>>(8)?
            .map(|raw| parse_time(&raw))
            .transpose()?,
    })
}

fn parse_json_column<T: serde::de::DeserializeOwned>(index: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(error))
    })
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> AppResult<bool> {
    let pragma = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&pragma)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

// Fixed precision keeps lexical order equal to chronological order.
fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, error.to_string())),
            )
        })
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::models::{Classification, Link, Project, ProjectId, ProjectType};
    use chrono::{Duration, Utc};
    use std::collections::BTreeSet;

    fn project(id: i64, name: &str) -> Project {
        Project {
            id: ProjectId(id),
            name: name.to_string(),
            notes: Some("check faucet".to_string()),
            links: vec![Link::new("Site", "example.org").expect("link")],
            classification: Classification::Tags(BTreeSet::from([ProjectType::Testnet])),
            completed: false,
            date_added: Utc::now() + Duration::seconds(id),
            date_completed: None,
        }
    }

    #[test]
    fn database_can_insert_and_read_project() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        let stored = project(1, "Alpha");
        let id = db.insert_project(&stored).expect("insert project");
        assert_eq!(id, ProjectId(1));

        let loaded = db.get_project(id).expect("get").expect("exists");
        assert_eq!(loaded.name, "Alpha");
        assert_eq!(loaded.links[0].url, "https://example.org");
        assert_eq!(loaded.classification, stored.classification);
        assert_eq!(loaded.date_added.timestamp(), stored.date_added.timestamp());
        assert!(db.get_project(ProjectId(99)).expect("get missing").is_none());
    }

    #[test]
    fn list_orders_newest_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        db.insert_project(&project(1, "Old")).expect("old");
        db.insert_project(&project(2, "New")).expect("new");

        let names = db
            .list_projects()
            .expect("list")
            .into_iter()
            .map(|project| project.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["New", "Old"]);
    }

    #[test]
    fn missing_rows_report_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        let update = db.update_project(ProjectId(5), &project(5, "Ghost")).expect_err("update");
        assert!(update.is_not_found());
        let delete = db.delete_project(ProjectId(5)).expect_err("delete");
        assert!(delete.is_not_found());
    }

    #[test]
    fn blank_names_and_duplicate_ids_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        let err = db.insert_project(&project(1, "  ")).expect_err("blank name");
        assert!(err.is_validation());

        db.insert_project(&project(1, "Alpha")).expect("insert");
        let err = db.insert_project(&project(1, "Beta")).expect_err("duplicate");
        assert!(err.is_validation());

        let err = db.update_project(ProjectId(1), &project(1, "")).expect_err("blank update");
        assert!(err.is_validation());
    }

    #[test]
    fn completion_fields_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        let stored = project(1, "Alpha");
        db.insert_project(&stored).expect("insert");

        let done = stored.marked_completed(Utc::now());
        db.update_project(stored.id, &done).expect("complete");
        let loaded = db.get_project(stored.id).expect("get").expect("exists");
        assert!(loaded.completed);
        assert!(loaded.date_completed.is_some());

        db.update_project(stored.id, &loaded.marked_active()).expect("reopen");
        let loaded = db.get_project(stored.id).expect("get").expect("exists");
        assert!(!loaded.completed);
        assert!(loaded.date_completed.is_none());
    }

    #[test]
    fn legacy_type_rows_keep_their_classification() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        let mut legacy = project(3, "Legacy");
        legacy.classification = Classification::Legacy(ProjectType::Node);
        db.insert_project(&legacy).expect("insert");

        let loaded = db.get_project(legacy.id).expect("get").expect("exists");
        assert_eq!(loaded.classification, Classification::Legacy(ProjectType::Node));
    }

    #[test]
    fn settings_merge_partial_updates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        let defaults = db.get_settings().expect("defaults");
        assert_eq!(defaults.default_types, vec![ProjectType::Daily]);
        assert!(!defaults.show_completed);

        let updated = db
            .update_settings(serde_json::json!({ "showCompleted": true }))
            .expect("update");
        assert!(updated.show_completed);
        assert_eq!(updated.default_types, vec![ProjectType::Daily]);

        let err = db
            .update_settings(serde_json::json!({ "defaultTypes": ["weekly"] }))
            .expect_err("unknown type");
        assert!(err.is_validation());
    }
}
