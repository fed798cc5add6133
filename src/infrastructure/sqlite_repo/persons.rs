use super::{parse_ts, SqliteRepository};
use crate::domain::{DomainError, Person};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

const PERSON_COLUMNS: &str = "id, name, avatar_url, created_at, updated_at";

fn row_to_person(row: &Row) -> rusqlite::Result<Person> {
    Ok(Person {
        id: row.get(0)?,
        name: row.get(1)?,
        avatar_url: row.get(2)?,
        created_at: parse_ts(3, row.get(3)?)?,
        updated_at: parse_ts(4, row.get(4)?)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl SqliteRepository {
    pub(crate) fn find_person_by_name_impl(
        &self,
        name: &str,
    ) -> Result<Option<Person>, DomainError> {
        self.with_conn(|conn| {
            let person = conn
                .query_row(
                    &format!("SELECT {} FROM persons WHERE name = ?1", PERSON_COLUMNS),
                    params![name],
                    row_to_person,
                )
                .optional()?;
            Ok(person)
        })
    }

    /// Insert-or-lookup: under the UNIQUE name constraint two racing
    /// creates converge on the same row, the loser just reads it back.
    pub(crate) fn create_person_impl(
        &self,
        name: &str,
        avatar_url: Option<&str>,
    ) -> Result<Person, DomainError> {
        self.with_conn(|conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT OR IGNORE INTO persons (name, avatar_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![name, avatar_url, now],
            )?;
            let person = conn.query_row(
                &format!("SELECT {} FROM persons WHERE name = ?1", PERSON_COLUMNS),
                params![name],
                row_to_person,
            )?;
            Ok(person)
        })
    }

    pub(crate) fn set_person_avatar_impl(
        &self,
        person_id: i64,
        url: &str,
    ) -> Result<(), DomainError> {
        self.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE persons SET avatar_url = ?1, updated_at = ?2 WHERE id = ?3",
                params![url, Utc::now().to_rfc3339(), person_id],
            )?;
            if affected == 0 {
                return Err(DomainError::NotFound);
            }
            Ok(())
        })
    }

    pub(crate) fn list_persons_impl(&self) -> Result<Vec<Person>, DomainError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM persons ORDER BY name COLLATE NOCASE",
                PERSON_COLUMNS
            ))?;
            let rows = stmt.query_map([], row_to_person)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub(crate) fn find_person_impl(&self, person_id: i64) -> Result<Option<Person>, DomainError> {
        self.with_conn(|conn| {
            let person = conn
                .query_row(
                    &format!("SELECT {} FROM persons WHERE id = ?1", PERSON_COLUMNS),
                    params![person_id],
                    row_to_person,
                )
                .optional()?;
            Ok(person)
        })
    }

    pub(crate) fn rename_person_impl(
        &self,
        person_id: i64,
        name: &str,
    ) -> Result<(), DomainError> {
        self.with_conn(|conn| {
            let affected = conn
                .execute(
                    "UPDATE persons SET name = ?1, updated_at = ?2 WHERE id = ?3",
                    params![name, Utc::now().to_rfc3339(), person_id],
                )
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        DomainError::DuplicateName
                    } else {
                        DomainError::from(e)
                    }
                })?;
            if affected == 0 {
                return Err(DomainError::NotFound);
            }
            Ok(())
        })
    }

    pub(crate) fn delete_person_impl(&self, person_id: i64) -> Result<(), DomainError> {
        self.with_conn(|conn| {
            let affected =
                conn.execute("DELETE FROM persons WHERE id = ?1", params![person_id])?;
            if affected == 0 {
                return Err(DomainError::NotFound);
            }
            Ok(())
        })
    }

    /// Names in the same order as `ids`; unknown ids are dropped silently
    /// (a deleted person simply disappears from old photo summaries).
    pub(crate) fn person_names_impl(&self, ids: &[i64]) -> Result<Vec<String>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let placeholders = vec!["?"; ids.len()].join(",");
            let sql = format!(
                "SELECT id, name FROM persons WHERE id IN ({})",
                placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter().copied()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;

            let by_id: std::collections::HashMap<i64, String> =
                rows.collect::<Result<_, _>>()?;
            Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
        })
    }
}
