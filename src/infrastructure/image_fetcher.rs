use crate::domain::{DomainError, ImageFetcher};
use async_trait::async_trait;
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Downloads source photos for local cropping. Failures map to `Crop`
/// errors: an unfetchable image skips that photo's faces, nothing more.
pub struct HttpImageFetcher {
    http: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new() -> Result<Self, DomainError> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| DomainError::Crop(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DomainError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DomainError::Crop(format!("image download failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DomainError::Crop(format!(
                "image download returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DomainError::Crop(format!("image download truncated: {}", e)))?;
        Ok(bytes.to_vec())
    }
}
