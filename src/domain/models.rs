use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A photo uploaded by a family member. The permanent copy lives in the
/// cloud image store; `url` is its public address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub url: String,
    /// Ids of persons tagged in this photo. Empty means "needs tagging".
    /// Only ever grown by set union, never overwritten destructively.
    #[serde(default)]
    pub person_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Photo {
    pub fn needs_tagging(&self) -> bool {
        self.person_ids.is_empty()
    }
}

/// A known person. Created lazily the first time a face crop is labeled
/// with an unseen name. Names are unique: two people entering the same
/// name are treated as the same person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Face rectangle as reported by the detection service: integer pixel
/// offsets relative to the original, undownscaled image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
}

/// One face found by the detection service. The token is opaque and only
/// valid for a short service-side retention window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedFace {
    pub face_token: String,
    pub rect: BoundingBox,
}

/// A crop uploaded to temporary storage, waiting for a human to name it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedCrop {
    pub photo_id: i64,
    pub photo_name: String,
    /// Index within the photo, in the order the detection service returned
    /// the faces. Stable for the lifetime of the tagging session.
    pub face_index: usize,
    pub face_token: String,
    pub crop_url: String,
    pub crop_public_id: String,
}

/// Asset handle returned by the staging store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedAsset {
    pub url: String,
    pub public_id: String,
}

/// Summary row for a photo that already had associations and was skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedPhotoSummary {
    pub photo_id: i64,
    pub photo_name: String,
    pub photo_url: String,
    pub person_names: Vec<String>,
}

/// Result of one detection batch. Partial success is the normal case:
/// `processed` and `skipped` let the caller render "3 of 5 processed".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggingRun {
    pub staged: Vec<StagedCrop>,
    pub already_tagged: Vec<TaggedPhotoSummary>,
    pub processed: usize,
    pub skipped: usize,
}

/// One human-labeled crop in a tagging submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagEntry {
    pub photo_id: i64,
    pub name: String,
    #[serde(default)]
    pub crop_url: Option<String>,
    #[serde(default)]
    pub crop_public_id: Option<String>,
    #[serde(default)]
    pub face_token: Option<String>,
}

/// Counts returned by reconciliation. Per-entry failures are reported
/// here, not raised.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileStats {
    pub persons_created: usize,
    pub photos_updated: usize,
    pub entries_failed: usize,
}
