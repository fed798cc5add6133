use super::models::{DetectedFace, Person, Photo, StagedAsset};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Detection error: {0}")]
    Detection(String),
    #[error("Crop error: {0}")]
    Crop(String),
    #[error("Staging error: {0}")]
    Staging(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Not found")]
    NotFound,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Name already in use")]
    DuplicateName,
}

impl From<rusqlite::Error> for DomainError {
    fn from(err: rusqlite::Error) -> Self {
        DomainError::Database(err.to_string())
    }
}

/// External face-detection service. One outbound HTTP call per invocation,
/// no retries here; retry policy, if any, belongs to the orchestrator.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Detect faces in an image the service can fetch by URL. Zero faces
    /// is a successful empty result, not an error.
    async fn detect(&self, image_url: &str) -> Result<Vec<DetectedFace>, DomainError>;

    /// Ask the service for a pre-rendered thumbnail of one detected face.
    /// Only works while the face token is still within its retention window.
    async fn thumbnail(&self, face_token: &str) -> Result<Vec<u8>, DomainError>;
}

/// Fetches raw image bytes over HTTP (the source photo for local cropping).
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DomainError>;
}

/// Cloud image storage. Temporary crops, permanent person avatars and the
/// user-facing photo store are distinct logical folders in one provider.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Upload a crop to the temporary folder under a collision-resistant id.
    async fn stage_crop(&self, jpeg: Vec<u8>) -> Result<StagedAsset, DomainError>;

    /// Copy a staged crop into the permanent persons folder, then delete the
    /// temporary original. Not atomic: a failed delete is logged and
    /// swallowed (a leaked temp asset is acceptable, a duplicate permanent
    /// asset is not). Returns the permanent URL.
    async fn promote_crop(
        &self,
        source_url: &str,
        temp_public_id: &str,
        person_name: &str,
    ) -> Result<String, DomainError>;

    /// Upload an image straight into the permanent persons folder.
    async fn upload_avatar(&self, jpeg: Vec<u8>, person_name: &str)
        -> Result<String, DomainError>;

    /// Upload a user photo into the photo folder.
    async fn upload_photo(&self, bytes: Vec<u8>, name: &str) -> Result<StagedAsset, DomainError>;

    /// Best-effort delete of an asset addressed by its public URL.
    async fn delete_by_url(&self, url: &str) -> Result<(), DomainError>;
}

/// Process-wide registry of known persons. A dumb store: the create-or-reuse
/// resolution policy lives in the reconciliation use case.
pub trait PersonRegistry: Send + Sync {
    fn find_person_by_name(&self, name: &str) -> Result<Option<Person>, DomainError>;
    /// Insert-or-lookup under the UNIQUE name constraint, so concurrent
    /// submissions of the same name cannot produce duplicate rows.
    fn create_person(&self, name: &str, avatar_url: Option<&str>) -> Result<Person, DomainError>;
    fn set_person_avatar(&self, person_id: i64, url: &str) -> Result<(), DomainError>;
    fn list_persons(&self) -> Result<Vec<Person>, DomainError>;
    fn find_person(&self, person_id: i64) -> Result<Option<Person>, DomainError>;
    fn rename_person(&self, person_id: i64, name: &str) -> Result<(), DomainError>;
    fn delete_person(&self, person_id: i64) -> Result<(), DomainError>;
    fn person_names(&self, ids: &[i64]) -> Result<Vec<String>, DomainError>;
}

/// Photos and their person associations, scoped to an owner.
pub trait PhotoLedger: Send + Sync {
    fn insert_photo(&self, owner_id: i64, name: &str, url: &str) -> Result<Photo, DomainError>;
    fn find_photo(&self, owner_id: i64, photo_id: i64) -> Result<Option<Photo>, DomainError>;
    fn find_photos(&self, owner_id: i64, ids: &[i64]) -> Result<Vec<Photo>, DomainError>;
    fn photo_person_ids(&self, photo_id: i64) -> Result<Vec<i64>, DomainError>;
    /// Union `person_ids` into the photo's association set. Idempotent.
    /// Returns false when no photo matched the (id, owner) pair.
    fn merge_photo_persons(
        &self,
        photo_id: i64,
        owner_id: i64,
        person_ids: &[i64],
    ) -> Result<bool, DomainError>;
}
