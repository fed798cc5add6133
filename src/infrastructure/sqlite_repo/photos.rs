use super::{parse_person_ids, parse_ts, SqliteRepository};
use crate::domain::{DomainError, Photo};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

const PHOTO_COLUMNS: &str = "id, owner_id, name, url, person_ids, created_at, updated_at";

fn row_to_photo(row: &Row) -> rusqlite::Result<Photo> {
    let raw_ids: Option<String> = row.get(4)?;
    Ok(Photo {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        url: row.get(3)?,
        person_ids: parse_person_ids(raw_ids.as_deref().unwrap_or("")),
        created_at: parse_ts(5, row.get(5)?)?,
        updated_at: parse_ts(6, row.get(6)?)?,
    })
}

impl SqliteRepository {
    pub(crate) fn insert_photo_impl(
        &self,
        owner_id: i64,
        name: &str,
        url: &str,
    ) -> Result<Photo, DomainError> {
        self.with_conn(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO photos (owner_id, name, url, person_ids, created_at, updated_at)
                 VALUES (?1, ?2, ?3, '[]', ?4, ?5)",
                params![owner_id, name, url, now.to_rfc3339(), now.to_rfc3339()],
            )?;
            Ok(Photo {
                id: conn.last_insert_rowid(),
                owner_id,
                name: name.to_string(),
                url: url.to_string(),
                person_ids: Vec::new(),
                created_at: now,
                updated_at: now,
            })
        })
    }

    pub(crate) fn find_photo_impl(
        &self,
        owner_id: i64,
        photo_id: i64,
    ) -> Result<Option<Photo>, DomainError> {
        self.with_conn(|conn| {
            let photo = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM photos WHERE id = ?1 AND owner_id = ?2",
                        PHOTO_COLUMNS
                    ),
                    params![photo_id, owner_id],
                    row_to_photo,
                )
                .optional()?;
            Ok(photo)
        })
    }

    pub(crate) fn find_photos_impl(
        &self,
        owner_id: i64,
        ids: &[i64],
    ) -> Result<Vec<Photo>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let placeholders = vec!["?"; ids.len()].join(",");
            let sql = format!(
                "SELECT {} FROM photos WHERE id IN ({}) AND owner_id = ? ORDER BY created_at DESC",
                PHOTO_COLUMNS, placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(ids.iter().copied().chain(std::iter::once(owner_id))),
                row_to_photo,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub(crate) fn photo_person_ids_impl(&self, photo_id: i64) -> Result<Vec<i64>, DomainError> {
        self.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT person_ids FROM photos WHERE id = ?1",
                    params![photo_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or(DomainError::NotFound)?;
            Ok(parse_person_ids(raw.as_deref().unwrap_or("")))
        })
    }

    pub(crate) fn merge_photo_persons_impl(
        &self,
        photo_id: i64,
        owner_id: i64,
        person_ids: &[i64],
    ) -> Result<bool, DomainError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<Option<String>> = tx
                .query_row(
                    "SELECT person_ids FROM photos WHERE id = ?1 AND owner_id = ?2",
                    params![photo_id, owner_id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(raw) = existing else {
                return Ok(false);
            };

            let mut ids = parse_person_ids(raw.as_deref().unwrap_or(""));
            let mut changed = false;
            for id in person_ids {
                if !ids.contains(id) {
                    ids.push(*id);
                    changed = true;
                }
            }

            if changed {
                let encoded = serde_json::to_string(&ids)
                    .map_err(|e| DomainError::Database(e.to_string()))?;
                tx.execute(
                    "UPDATE photos SET person_ids = ?1, updated_at = ?2
                     WHERE id = ?3 AND owner_id = ?4",
                    params![encoded, Utc::now().to_rfc3339(), photo_id, owner_id],
                )?;
            }

            tx.commit()?;
            Ok(true)
        })
    }
}
