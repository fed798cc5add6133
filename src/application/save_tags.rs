use crate::domain::{
    AssetStore, DomainError, FaceDetector, PersonRegistry, PhotoLedger, ReconcileStats, TagEntry,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Second half of the tagging workflow: turn human-assigned names for staged
/// crops into durable person records and photo associations.
///
/// Entries are processed in submission order. Person resolution can create a
/// person on the first occurrence of a name and enrich it with an avatar on
/// the same or a later occurrence, so the first occurrence that has a crop
/// wins the avatar. Associations are merged once per photo at the end.
pub struct SaveFaceTagsUseCase {
    ledger: Arc<dyn PhotoLedger>,
    registry: Arc<dyn PersonRegistry>,
    detector: Arc<dyn FaceDetector>,
    store: Arc<dyn AssetStore>,
}

impl SaveFaceTagsUseCase {
    pub fn new(
        ledger: Arc<dyn PhotoLedger>,
        registry: Arc<dyn PersonRegistry>,
        detector: Arc<dyn FaceDetector>,
        store: Arc<dyn AssetStore>,
    ) -> Self {
        Self {
            ledger,
            registry,
            detector,
            store,
        }
    }

    pub async fn execute(
        &self,
        owner_id: i64,
        entries: &[TagEntry],
    ) -> Result<ReconcileStats, DomainError> {
        let mut stats = ReconcileStats::default();
        if entries.is_empty() {
            return Ok(stats);
        }

        // photo id -> person ids, insertion-ordered across photos
        let mut photo_order: Vec<i64> = Vec::new();
        let mut photo_persons: HashMap<i64, Vec<i64>> = HashMap::new();

        for entry in entries {
            let name = entry.name.trim();
            if name.is_empty() {
                continue;
            }

            match self.resolve_person(entry, name).await {
                Ok((person_id, created)) => {
                    if created {
                        stats.persons_created += 1;
                    }
                    let ids = photo_persons.entry(entry.photo_id).or_insert_with(|| {
                        photo_order.push(entry.photo_id);
                        Vec::new()
                    });
                    if !ids.contains(&person_id) {
                        ids.push(person_id);
                    }
                }
                Err(e) => {
                    warn!(
                        photo_id = entry.photo_id,
                        name, "failed to reconcile tag entry: {}", e
                    );
                    stats.entries_failed += 1;
                }
            }
        }

        // One merge per photo, union semantics; merging the same ids again
        // is a no-op.
        for photo_id in photo_order {
            let person_ids = &photo_persons[&photo_id];
            match self.ledger.merge_photo_persons(photo_id, owner_id, person_ids) {
                Ok(true) => stats.photos_updated += 1,
                Ok(false) => {
                    warn!(photo_id, owner_id, "photo not found or not owned, merge skipped")
                }
                Err(e) => {
                    warn!(photo_id, "association merge failed: {}", e);
                    stats.entries_failed += 1;
                }
            }
        }

        info!(
            persons_created = stats.persons_created,
            photos_updated = stats.photos_updated,
            entries_failed = stats.entries_failed,
            "tagging submission reconciled"
        );

        Ok(stats)
    }

    /// Create-or-reuse by name. Reused persons without an avatar get one
    /// from this occurrence's crop when available; an existing avatar is
    /// never replaced.
    async fn resolve_person(
        &self,
        entry: &TagEntry,
        name: &str,
    ) -> Result<(i64, bool), DomainError> {
        if let Some(person) = self.registry.find_person_by_name(name)? {
            if person.avatar_url.is_none() {
                if let Some(url) = self.acquire_avatar(entry, name).await {
                    self.registry.set_person_avatar(person.id, &url)?;
                }
            }
            return Ok((person.id, false));
        }

        let avatar_url = self.acquire_avatar(entry, name).await;
        let person = self.registry.create_person(name, avatar_url.as_deref())?;
        Ok((person.id, true))
    }

    /// Best effort: promote the staged crop to permanent storage, or fall
    /// back to the detection-service thumbnail when only the face token
    /// survived. A missing avatar never blocks the association.
    async fn acquire_avatar(&self, entry: &TagEntry, name: &str) -> Option<String> {
        if let (Some(url), Some(public_id)) = (&entry.crop_url, &entry.crop_public_id) {
            match self.store.promote_crop(url, public_id, name).await {
                Ok(permanent) => return Some(permanent),
                Err(e) => {
                    warn!(photo_id = entry.photo_id, name, "crop promotion failed: {}", e)
                }
            }
        }

        if let Some(token) = &entry.face_token {
            let jpeg = match self.detector.thumbnail(token).await {
                Ok(jpeg) => jpeg,
                Err(e) => {
                    warn!(photo_id = entry.photo_id, name, "thumbnail fetch failed: {}", e);
                    return None;
                }
            };
            match self.store.upload_avatar(jpeg, name).await {
                Ok(url) => return Some(url),
                Err(e) => {
                    warn!(photo_id = entry.photo_id, name, "avatar upload failed: {}", e)
                }
            }
        }

        None
    }
}
