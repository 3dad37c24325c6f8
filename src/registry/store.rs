//! SQLite-backed persistence for course metadata.
//!
//! A single bundled-SQLite connection behind a mutex is enough here:
//! registry lookups are tiny point queries and writes only happen on
//! admin actions.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::course::{validate_slug, Course, CourseId};

/// Course registry store.
#[derive(Clone)]
pub struct CourseStore {
    conn: Arc<Mutex<Connection>>,
}

impl CourseStore {
    /// Open (and migrate) the registry database at `path`. The parent
    /// directory is created if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create registry directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open registry database: {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory registry, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("registry lock poisoned");
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS courses (
                id               TEXT PRIMARY KEY,
                slug             TEXT NOT NULL UNIQUE,
                content_group_id TEXT,
                default_route    TEXT,
                content_path     TEXT,
                created_at       TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_courses_slug ON courses(slug);",
        )
        .context("Failed to migrate course registry schema")?;
        Ok(())
    }

    /// Insert a new course. Fails on duplicate slug.
    pub fn insert(&self, course: &Course) -> Result<()> {
        validate_slug(&course.slug)?;

        let conn = self.conn.lock().expect("registry lock poisoned");
        conn.execute(
            "INSERT INTO courses (id, slug, content_group_id, default_route, content_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                course.id.to_string(),
                course.slug,
                course.content_group_id,
                course.default_route,
                course.content_path.as_ref().map(|p| p.display().to_string()),
                course.created_at.to_rfc3339(),
            ],
        )
        .with_context(|| format!("Failed to insert course: {}", course.slug))?;
        Ok(())
    }

    /// Exact-match lookup by slug.
    pub fn find_by_slug(&self, slug: &str) -> Result<Option<Course>> {
        let conn = self.conn.lock().expect("registry lock poisoned");
        conn.query_row(
            "SELECT id, slug, content_group_id, default_route, content_path, created_at
             FROM courses WHERE slug = ?1",
            params![slug],
            row_to_course,
        )
        .optional()
        .with_context(|| format!("Failed to query course by slug: {}", slug))
    }

    /// Lookup by id.
    pub fn find_by_id(&self, id: CourseId) -> Result<Option<Course>> {
        let conn = self.conn.lock().expect("registry lock poisoned");
        conn.query_row(
            "SELECT id, slug, content_group_id, default_route, content_path, created_at
             FROM courses WHERE id = ?1",
            params![id.to_string()],
            row_to_course,
        )
        .optional()
        .with_context(|| format!("Failed to query course by id: {}", id))
    }

    /// All courses, oldest first.
    pub fn list(&self) -> Result<Vec<Course>> {
        let conn = self.conn.lock().expect("registry lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, slug, content_group_id, default_route, content_path, created_at
             FROM courses ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map([], row_to_course)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list courses")?;
        Ok(rows)
    }

    /// Link a commerce product / content group to a course.
    pub fn set_content_group(&self, id: CourseId, group: Option<&str>) -> Result<()> {
        self.update_column(id, "content_group_id", group)
    }

    /// Change the course's entry route.
    pub fn set_default_route(&self, id: CourseId, route: Option<&str>) -> Result<()> {
        self.update_column(id, "default_route", route)
    }

    /// Record the extracted tree location. Called only by the ingestor
    /// after a successful replace.
    pub fn set_content_path(&self, id: CourseId, path: &Path) -> Result<()> {
        self.update_column(id, "content_path", Some(&path.display().to_string()))
    }

    /// Clear the extracted tree location after content removal.
    pub fn clear_content_path(&self, id: CourseId) -> Result<()> {
        self.update_column(id, "content_path", None)
    }

    fn update_column(&self, id: CourseId, column: &str, value: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().expect("registry lock poisoned");
        let updated = conn
            .execute(
                // Column name comes from a fixed internal set, never from input.
                &format!("UPDATE courses SET {} = ?1 WHERE id = ?2", column),
                params![value, id.to_string()],
            )
            .with_context(|| format!("Failed to update course {}", id))?;
        anyhow::ensure!(updated == 1, "No course with id {}", id);
        Ok(())
    }
}

fn row_to_course(row: &Row<'_>) -> rusqlite::Result<Course> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(5)?;

    Ok(Course {
        id: CourseId::parse(&id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
        })?,
        slug: row.get(1)?,
        content_group_id: row.get(2)?,
        default_route: row.get(3)?,
        content_path: row.get::<_, Option<String>>(4)?.map(PathBuf::from),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, e.into())
            })?
            .with_timezone(&Utc),
    })
}
