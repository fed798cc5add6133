use crate::domain::{AssetStore, DomainError, Photo, PhotoLedger};
use std::sync::Arc;

/// Image formats the photo store accepts.
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

pub struct UploadPhotoUseCase {
    ledger: Arc<dyn PhotoLedger>,
    store: Arc<dyn AssetStore>,
}

impl UploadPhotoUseCase {
    pub fn new(ledger: Arc<dyn PhotoLedger>, store: Arc<dyn AssetStore>) -> Self {
        Self { ledger, store }
    }

    /// Push the bytes to the cloud photo store and record the photo with an
    /// empty association set, i.e. "needs tagging".
    pub async fn execute(
        &self,
        owner_id: i64,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<Photo, DomainError> {
        if data.is_empty() {
            return Err(DomainError::InvalidInput("empty upload".into()));
        }

        let extension = std::path::Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("bin")
            .to_lowercase();

        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(DomainError::InvalidInput(format!(
                "file type not allowed: .{}",
                extension
            )));
        }

        let display_name = std::path::Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename)
            .to_string();

        let asset = self.store.upload_photo(data, &display_name).await?;
        self.ledger.insert_photo(owner_id, &display_name, &asset.url)
    }
}

#[cfg(test)]
mod tests {
    use super::ALLOWED_EXTENSIONS;

    #[test]
    fn dangerous_extensions_rejected() {
        for ext in ["html", "svg", "exe", "js", "php", "sh"] {
            assert!(
                !ALLOWED_EXTENSIONS.contains(&ext),
                "extension {} must not be in allowlist",
                ext
            );
        }
    }
}
