use crate::domain::{AssetStore, DomainError, Person, PersonRegistry};
use std::sync::Arc;
use tracing::warn;

/// CRUD-ish management of the person registry: the list page, renames,
/// deletions and manual avatar replacement.
pub struct ManagePersonsUseCase {
    registry: Arc<dyn PersonRegistry>,
    store: Arc<dyn AssetStore>,
}

impl ManagePersonsUseCase {
    pub fn new(registry: Arc<dyn PersonRegistry>, store: Arc<dyn AssetStore>) -> Self {
        Self { registry, store }
    }

    pub fn list(&self) -> Result<Vec<Person>, DomainError> {
        self.registry.list_persons()
    }

    pub fn rename(&self, person_id: i64, name: &str) -> Result<(), DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::InvalidInput("person name cannot be empty".into()));
        }

        if let Some(existing) = self.registry.find_person_by_name(name)? {
            if existing.id != person_id {
                return Err(DomainError::DuplicateName);
            }
        }

        self.registry.rename_person(person_id, name)
    }

    pub async fn delete(&self, person_id: i64) -> Result<(), DomainError> {
        let person = self
            .registry
            .find_person(person_id)?
            .ok_or(DomainError::NotFound)?;

        // Remove the avatar asset first; a leaked asset is not worth
        // failing the deletion over.
        if let Some(url) = &person.avatar_url {
            if let Err(e) = self.store.delete_by_url(url).await {
                warn!(person_id, "failed to delete avatar asset: {}", e);
            }
        }

        self.registry.delete_person(person_id)
    }

    /// Replace a person's avatar with an uploaded image. The previous
    /// avatar asset is removed best-effort.
    pub async fn set_avatar(&self, person_id: i64, image: Vec<u8>) -> Result<String, DomainError> {
        let person = self
            .registry
            .find_person(person_id)?
            .ok_or(DomainError::NotFound)?;

        let url = self.store.upload_avatar(image, &person.name).await?;
        self.registry.set_person_avatar(person_id, &url)?;

        if let Some(old) = &person.avatar_url {
            if let Err(e) = self.store.delete_by_url(old).await {
                warn!(person_id, "failed to delete previous avatar: {}", e);
            }
        }

        Ok(url)
    }
}
