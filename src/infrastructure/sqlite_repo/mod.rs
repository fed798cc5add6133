mod persons;
mod photos;

use crate::domain::DomainError;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::sync::{Condvar, Mutex};

const POOL_SIZE: usize = 4;

pub struct SqliteRepository {
    pool: Mutex<Vec<Connection>>,
    available: Condvar,
}

impl SqliteRepository {
    pub fn new(path: &str) -> Result<Self, DomainError> {
        let conn = Self::open_conn(path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS photos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                url TEXT NOT NULL,
                person_ids TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| DomainError::Database(format!("Failed to create photos table: {}", e)))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_photos_owner ON photos(owner_id)",
            [],
        )
        .map_err(|e| DomainError::Database(format!("Failed to create index: {}", e)))?;

        // Unique name closes the lookup-then-create race between concurrent
        // tagging submissions.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS persons (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                avatar_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| DomainError::Database(format!("Failed to create persons table: {}", e)))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_persons_name ON persons(name)",
            [],
        )
        .map_err(|e| DomainError::Database(format!("Failed to create index: {}", e)))?;

        let mut connections = vec![conn];
        for _ in 1..POOL_SIZE {
            connections.push(Self::open_conn(path)?);
        }

        Ok(Self {
            pool: Mutex::new(connections),
            available: Condvar::new(),
        })
    }

    fn open_conn(path: &str) -> Result<Connection, DomainError> {
        let conn = Connection::open(path)
            .map_err(|e| DomainError::Database(format!("Failed to open connection: {}", e)))?;

        let _: i64 = conn
            .query_row("PRAGMA busy_timeout=10000", [], |r| r.get(0))
            .unwrap_or(10000);
        conn.execute_batch("PRAGMA foreign_keys=ON")
            .map_err(|e| DomainError::Database(format!("Failed to set pragma: {}", e)))?;

        Ok(conn)
    }

    pub(crate) fn with_conn<T, F>(&self, f: F) -> Result<T, DomainError>
    where
        F: FnOnce(&mut Connection) -> Result<T, DomainError>,
    {
        let mut conn = {
            let mut pool = self.pool.lock().unwrap();
            loop {
                if let Some(conn) = pool.pop() {
                    break conn;
                }
                pool = self.available.wait(pool).unwrap();
            }
        };

        let result = f(&mut conn);

        self.pool.lock().unwrap().push(conn);
        self.available.notify_one();

        result
    }
}

// ---- Trait implementations (delegate to submodule _impl methods) ----

use crate::domain::{Person, PersonRegistry, Photo, PhotoLedger};

impl PersonRegistry for SqliteRepository {
    fn find_person_by_name(&self, name: &str) -> Result<Option<Person>, DomainError> {
        self.find_person_by_name_impl(name)
    }

    fn create_person(&self, name: &str, avatar_url: Option<&str>) -> Result<Person, DomainError> {
        self.create_person_impl(name, avatar_url)
    }

    fn set_person_avatar(&self, person_id: i64, url: &str) -> Result<(), DomainError> {
        self.set_person_avatar_impl(person_id, url)
    }

    fn list_persons(&self) -> Result<Vec<Person>, DomainError> {
        self.list_persons_impl()
    }

    fn find_person(&self, person_id: i64) -> Result<Option<Person>, DomainError> {
        self.find_person_impl(person_id)
    }

    fn rename_person(&self, person_id: i64, name: &str) -> Result<(), DomainError> {
        self.rename_person_impl(person_id, name)
    }

    fn delete_person(&self, person_id: i64) -> Result<(), DomainError> {
        self.delete_person_impl(person_id)
    }

    fn person_names(&self, ids: &[i64]) -> Result<Vec<String>, DomainError> {
        self.person_names_impl(ids)
    }
}

impl PhotoLedger for SqliteRepository {
    fn insert_photo(&self, owner_id: i64, name: &str, url: &str) -> Result<Photo, DomainError> {
        self.insert_photo_impl(owner_id, name, url)
    }

    fn find_photo(&self, owner_id: i64, photo_id: i64) -> Result<Option<Photo>, DomainError> {
        self.find_photo_impl(owner_id, photo_id)
    }

    fn find_photos(&self, owner_id: i64, ids: &[i64]) -> Result<Vec<Photo>, DomainError> {
        self.find_photos_impl(owner_id, ids)
    }

    fn photo_person_ids(&self, photo_id: i64) -> Result<Vec<i64>, DomainError> {
        self.photo_person_ids_impl(photo_id)
    }

    fn merge_photo_persons(
        &self,
        photo_id: i64,
        owner_id: i64,
        person_ids: &[i64],
    ) -> Result<bool, DomainError> {
        self.merge_photo_persons_impl(photo_id, owner_id, person_ids)
    }
}

// ---- Helpers shared across submodules ----

/// Association sets are stored as a JSON array of person ids. Legacy rows
/// may hold '', 'null' or malformed text; all of those read back as empty.
pub(crate) fn parse_person_ids(raw: &str) -> Vec<i64> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str::<Option<Vec<i64>>>(raw)
        .ok()
        .flatten()
        .unwrap_or_default()
}

pub(crate) fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PersonRegistry, PhotoLedger};

    fn test_repo() -> (tempfile::TempDir, SqliteRepository) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let repo = SqliteRepository::new(path.to_str().unwrap()).unwrap();
        (dir, repo)
    }

    #[test]
    fn parse_person_ids_tolerates_legacy_values() {
        assert_eq!(parse_person_ids(""), Vec::<i64>::new());
        assert_eq!(parse_person_ids("null"), Vec::<i64>::new());
        assert_eq!(parse_person_ids("[]"), Vec::<i64>::new());
        assert_eq!(parse_person_ids("None"), Vec::<i64>::new());
        assert_eq!(parse_person_ids("[1, 2, 3]"), vec![1, 2, 3]);
    }

    #[test]
    fn merge_is_union_and_idempotent() {
        let (_dir, repo) = test_repo();
        let photo = repo.insert_photo(1, "beach day", "https://img/1.jpg").unwrap();
        assert!(photo.needs_tagging());

        assert!(repo.merge_photo_persons(photo.id, 1, &[10, 11]).unwrap());
        assert_eq!(repo.photo_person_ids(photo.id).unwrap(), vec![10, 11]);

        // Same set again: no change
        assert!(repo.merge_photo_persons(photo.id, 1, &[10, 11]).unwrap());
        assert_eq!(repo.photo_person_ids(photo.id).unwrap(), vec![10, 11]);

        // Overlapping set: union, existing order preserved
        assert!(repo.merge_photo_persons(photo.id, 1, &[11, 12]).unwrap());
        assert_eq!(repo.photo_person_ids(photo.id).unwrap(), vec![10, 11, 12]);
    }

    #[test]
    fn merge_enforces_ownership() {
        let (_dir, repo) = test_repo();
        let photo = repo.insert_photo(1, "picnic", "https://img/2.jpg").unwrap();

        assert!(!repo.merge_photo_persons(photo.id, 99, &[5]).unwrap());
        assert_eq!(repo.photo_person_ids(photo.id).unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn create_person_is_insert_or_lookup() {
        let (_dir, repo) = test_repo();
        let first = repo.create_person("Alice", Some("https://img/a.jpg")).unwrap();
        let second = repo.create_person("Alice", None).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.avatar_url.as_deref(), Some("https://img/a.jpg"));
        assert_eq!(repo.list_persons().unwrap().len(), 1);
    }

    #[test]
    fn rename_rejects_taken_name() {
        let (_dir, repo) = test_repo();
        let alice = repo.create_person("Alice", None).unwrap();
        repo.create_person("Bob", None).unwrap();

        assert!(matches!(
            repo.rename_person(alice.id, "Bob"),
            Err(DomainError::DuplicateName)
        ));
        repo.rename_person(alice.id, "Alicia").unwrap();
        assert!(repo.find_person_by_name("Alicia").unwrap().is_some());
    }

    #[test]
    fn person_names_follow_requested_order() {
        let (_dir, repo) = test_repo();
        let a = repo.create_person("Alice", None).unwrap();
        let b = repo.create_person("Bob", None).unwrap();

        let names = repo.person_names(&[b.id, a.id, 999]).unwrap();
        assert_eq!(names, vec!["Bob".to_string(), "Alice".to_string()]);
    }

    #[test]
    fn find_photos_scopes_by_owner() {
        let (_dir, repo) = test_repo();
        let mine = repo.insert_photo(1, "mine", "https://img/m.jpg").unwrap();
        repo.insert_photo(2, "theirs", "https://img/t.jpg").unwrap();

        let photos = repo.find_photos(1, &[mine.id, mine.id + 1]).unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].id, mine.id);
    }
}
