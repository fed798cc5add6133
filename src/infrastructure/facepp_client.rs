use crate::domain::{BoundingBox, DetectedFace, DomainError, FaceDetector};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_DETECT_URL: &str = "https://api-us.faceplusplus.com/facepp/v3/detect";
const DEFAULT_THUMBNAIL_URL: &str = "https://api-us.faceplusplus.com/facepp/v3/face/thumbnail";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Credentials and endpoints for the Face++ detection service. Built once
/// in main and handed to the client; nothing here reads the environment.
#[derive(Debug, Clone)]
pub struct FaceppConfig {
    pub api_key: String,
    pub api_secret: String,
    pub detect_url: String,
    pub thumbnail_url: String,
    pub timeout: Duration,
}

impl FaceppConfig {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
            detect_url: DEFAULT_DETECT_URL.to_string(),
            thumbnail_url: DEFAULT_THUMBNAIL_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct FaceppClient {
    http: reqwest::Client,
    config: FaceppConfig,
}

impl FaceppClient {
    pub fn new(config: FaceppConfig) -> Result<Self, DomainError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DomainError::Detection(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    /// Missing credentials are a configuration problem; fail before any
    /// network call is attempted.
    fn check_credentials(&self) -> Result<(), DomainError> {
        if self.config.api_key.is_empty() || self.config.api_secret.is_empty() {
            return Err(DomainError::Configuration(
                "face detection credentials not configured".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct DetectResponse {
    faces: Option<Vec<FaceEntry>>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct FaceEntry {
    face_token: String,
    face_rectangle: FaceRectangle,
}

#[derive(Deserialize)]
struct FaceRectangle {
    left: i64,
    top: i64,
    width: i64,
    height: i64,
}

#[derive(Deserialize)]
struct ThumbnailResponse {
    thumbnail: Option<String>,
    error_message: Option<String>,
}

#[async_trait]
impl FaceDetector for FaceppClient {
    async fn detect(&self, image_url: &str) -> Result<Vec<DetectedFace>, DomainError> {
        self.check_credentials()?;

        let response = self
            .http
            .post(&self.config.detect_url)
            .form(&[
                ("api_key", self.config.api_key.as_str()),
                ("api_secret", self.config.api_secret.as_str()),
                ("image_url", image_url),
            ])
            .send()
            .await
            .map_err(|e| DomainError::Detection(format!("detect request failed: {}", e)))?;

        let status = response.status();
        let body: DetectResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Detection(format!("invalid detect response: {}", e)))?;

        // The service reports errors through `error_message`; a valid
        // response with zero faces comes back as an empty `faces` array.
        match body.faces {
            Some(faces) => {
                debug!(count = faces.len(), "detection completed");
                Ok(faces
                    .into_iter()
                    .map(|f| DetectedFace {
                        face_token: f.face_token,
                        rect: BoundingBox {
                            left: f.face_rectangle.left,
                            top: f.face_rectangle.top,
                            width: f.face_rectangle.width,
                            height: f.face_rectangle.height,
                        },
                    })
                    .collect())
            }
            None => Err(DomainError::Detection(
                body.error_message
                    .unwrap_or_else(|| format!("detection service returned {}", status)),
            )),
        }
    }

    async fn thumbnail(&self, face_token: &str) -> Result<Vec<u8>, DomainError> {
        self.check_credentials()?;

        let response = self
            .http
            .post(&self.config.thumbnail_url)
            .form(&[
                ("api_key", self.config.api_key.as_str()),
                ("api_secret", self.config.api_secret.as_str()),
                ("face_token", face_token),
                // full size relative to the detected face
                ("thumbnail_rate", "1.0"),
            ])
            .send()
            .await
            .map_err(|e| DomainError::Detection(format!("thumbnail request failed: {}", e)))?;

        let status = response.status();
        let body: ThumbnailResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Detection(format!("invalid thumbnail response: {}", e)))?;

        match body.thumbnail {
            Some(encoded) => base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| DomainError::Detection(format!("undecodable thumbnail: {}", e))),
            None => Err(DomainError::Detection(
                body.error_message
                    .unwrap_or_else(|| format!("thumbnail service returned {}", status)),
            )),
        }
    }
}
