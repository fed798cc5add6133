use crate::domain::{AssetStore, DomainError, StagedAsset};
use async_trait::async_trait;
use rand::RngCore;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::warn;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cloudinary account plus the logical folders the app uses: short-lived
/// staged crops, permanent person avatars and the user photo store.
#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub temp_folder: String,
    pub persons_folder: String,
    pub photos_folder: String,
    pub timeout: Duration,
}

impl CloudinaryConfig {
    pub fn new(cloud_name: String, api_key: String, api_secret: String) -> Self {
        Self {
            cloud_name,
            api_key,
            api_secret,
            temp_folder: "temp_faces".to_string(),
            persons_folder: "persons".to_string(),
            photos_folder: "photos".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct CloudinaryStore {
    http: reqwest::Client,
    config: CloudinaryConfig,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    public_id: Option<String>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: Option<String>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// What gets sent as the `file` parameter: raw bytes, or a remote URL the
/// provider fetches server-side (used for the promote copy).
enum FilePayload {
    Bytes(Vec<u8>),
    RemoteUrl(String),
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig) -> Result<Self, DomainError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| DomainError::Staging(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    fn check_credentials(&self) -> Result<(), DomainError> {
        if self.config.cloud_name.is_empty()
            || self.config.api_key.is_empty()
            || self.config.api_secret.is_empty()
        {
            return Err(DomainError::Configuration(
                "image storage credentials not configured".into(),
            ));
        }
        Ok(())
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/{}",
            self.config.cloud_name, action
        )
    }

    /// Request signature over the alphabetically ordered parameters, as the
    /// provider's signed-upload scheme requires.
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
        sorted.sort_by_key(|(k, _)| *k);
        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        hasher.update(self.config.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn upload(
        &self,
        payload: FilePayload,
        folder: &str,
        public_id: &str,
    ) -> Result<StagedAsset, DomainError> {
        self.check_credentials()?;

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[
            ("folder", folder),
            ("public_id", public_id),
            ("signature_algorithm", "sha256"),
            ("timestamp", &timestamp),
        ]);

        let mut form = reqwest::multipart::Form::new()
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", folder.to_string())
            .text("public_id", public_id.to_string())
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        form = match payload {
            FilePayload::Bytes(bytes) => form.part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(format!("{}.jpg", public_id)),
            ),
            FilePayload::RemoteUrl(url) => form.text("file", url),
        };

        let response = self
            .http
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| DomainError::Staging(format!("upload request failed: {}", e)))?;

        let status = response.status();
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Staging(format!("invalid upload response: {}", e)))?;

        match (body.secure_url, body.public_id) {
            (Some(url), Some(public_id)) => Ok(StagedAsset { url, public_id }),
            _ => Err(DomainError::Staging(
                body.error
                    .map(|e| e.message)
                    .unwrap_or_else(|| format!("storage service returned {}", status)),
            )),
        }
    }

    async fn destroy(&self, public_id: &str) -> Result<(), DomainError> {
        self.check_credentials()?;

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[
            ("public_id", public_id),
            ("signature_algorithm", "sha256"),
            ("timestamp", &timestamp),
        ]);

        let response = self
            .http
            .post(self.endpoint("destroy"))
            .form(&[
                ("api_key", self.config.api_key.as_str()),
                ("public_id", public_id),
                ("timestamp", timestamp.as_str()),
                ("signature_algorithm", "sha256"),
                ("signature", signature.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DomainError::Staging(format!("destroy request failed: {}", e)))?;

        let body: DestroyResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Staging(format!("invalid destroy response: {}", e)))?;

        match body.result.as_deref() {
            Some("ok") | Some("not found") => Ok(()),
            other => Err(DomainError::Staging(
                body.error
                    .map(|e| e.message)
                    .unwrap_or_else(|| format!("unexpected destroy result: {:?}", other)),
            )),
        }
    }
}

fn hex_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

fn safe_name(name: &str) -> String {
    name.replace(' ', "_")
}

/// Derive the storage public id from a delivery URL: the path after
/// `/upload/`, minus the version segment and the file extension.
pub fn public_id_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/upload/")?;
    let rest = match rest.split_once('/') {
        Some((first, tail))
            if first.len() > 1
                && first.starts_with('v')
                && first[1..].chars().all(|c| c.is_ascii_digit()) =>
        {
            tail
        }
        _ => rest,
    };
    let rest = rest.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(rest);
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

#[async_trait]
impl AssetStore for CloudinaryStore {
    async fn stage_crop(&self, jpeg: Vec<u8>) -> Result<StagedAsset, DomainError> {
        let public_id = format!("temp_face_{}", hex_token(8));
        self.upload(FilePayload::Bytes(jpeg), &self.config.temp_folder, &public_id)
            .await
    }

    async fn promote_crop(
        &self,
        source_url: &str,
        temp_public_id: &str,
        person_name: &str,
    ) -> Result<String, DomainError> {
        let public_id = format!("person_face_{}_{}", safe_name(person_name), hex_token(4));
        let asset = self
            .upload(
                FilePayload::RemoteUrl(source_url.to_string()),
                &self.config.persons_folder,
                &public_id,
            )
            .await?;

        // The copy is the part that matters; a leaked temp asset only
        // costs storage.
        if let Err(e) = self.destroy(temp_public_id).await {
            warn!(temp_public_id, "failed to delete staged crop: {}", e);
        }

        Ok(asset.url)
    }

    async fn upload_avatar(
        &self,
        jpeg: Vec<u8>,
        person_name: &str,
    ) -> Result<String, DomainError> {
        let public_id = format!("person_face_{}_{}", safe_name(person_name), hex_token(4));
        let asset = self
            .upload(FilePayload::Bytes(jpeg), &self.config.persons_folder, &public_id)
            .await?;
        Ok(asset.url)
    }

    async fn upload_photo(&self, bytes: Vec<u8>, name: &str) -> Result<StagedAsset, DomainError> {
        let public_id = format!("photo_{}_{}", safe_name(name), hex_token(8));
        self.upload(FilePayload::Bytes(bytes), &self.config.photos_folder, &public_id)
            .await
    }

    async fn delete_by_url(&self, url: &str) -> Result<(), DomainError> {
        let public_id = public_id_from_url(url).ok_or_else(|| {
            DomainError::Staging(format!("cannot derive storage id from url: {}", url))
        })?;
        self.destroy(&public_id).await
    }
}
