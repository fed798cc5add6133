use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::application::{
    DetectFacesUseCase, ManagePersonsUseCase, SaveFaceTagsUseCase, UploadPhotoUseCase,
};
use crate::domain::{DomainError, TagEntry};

#[derive(Clone)]
pub struct AppState {
    pub detect_use_case: Arc<DetectFacesUseCase>,
    pub save_tags_use_case: Arc<SaveFaceTagsUseCase>,
    pub persons_use_case: Arc<ManagePersonsUseCase>,
    pub upload_use_case: Arc<UploadPhotoUseCase>,
}

// Error handling
impl IntoResponse for DomainError {
    fn into_response(self) -> axum::response::Response {
        match &self {
            DomainError::NotFound | DomainError::InvalidInput(_) | DomainError::DuplicateName => {}
            DomainError::Configuration(e) => error!("Configuration Error: {}", e),
            DomainError::Detection(e) => error!("Detection Error: {}", e),
            DomainError::Crop(e) => error!("Crop Error: {}", e),
            DomainError::Staging(e) => error!("Staging Error: {}", e),
            DomainError::Database(e) => error!("Database Error: {}", e),
        }

        let (status, message) = match self {
            DomainError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            DomainError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            DomainError::DuplicateName => {
                (StatusCode::CONFLICT, "Name already in use".to_string())
            }
            DomainError::Configuration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Service not configured".to_string(),
            ),
            DomainError::Detection(_) => {
                (StatusCode::BAD_GATEWAY, "Face detection failed".to_string())
            }
            DomainError::Crop(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Image processing failed".to_string(),
            ),
            DomainError::Staging(_) => {
                (StatusCode::BAD_GATEWAY, "Image storage failed".to_string())
            }
            DomainError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
            ),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

/// Owner identity is established upstream (session plumbing outside this
/// service); handlers only require that it arrives in `X-Owner-Id`.
fn owner_id(headers: &HeaderMap) -> Result<i64, DomainError> {
    headers
        .get("x-owner-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| DomainError::InvalidInput("missing or invalid X-Owner-Id header".into()))
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/photos", post(upload_photo_handler))
        .route("/face-tagging", get(face_tagging_handler))
        .route("/face-tags", post(save_face_tags_handler))
        .route("/persons", get(list_persons_handler))
        .route(
            "/persons/{id}",
            axum::routing::put(rename_person_handler).delete(delete_person_handler),
        )
        .route("/persons/{id}/avatar", post(person_avatar_handler))
        .with_state(state)
}

async fn upload_photo_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, DomainError> {
    let owner = owner_id(&headers)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DomainError::InvalidInput(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("unknown").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| DomainError::InvalidInput(e.to_string()))?;

        let photo = state
            .upload_use_case
            .execute(owner, &filename, data.to_vec())
            .await?;
        return Ok((StatusCode::CREATED, Json(photo)));
    }

    Err(DomainError::InvalidInput("no file field in upload".into()))
}

#[derive(Deserialize)]
pub struct FaceTaggingParams {
    /// Comma-separated photo ids
    pub ids: String,
    pub force: Option<bool>,
}

async fn face_tagging_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<FaceTaggingParams>,
) -> Result<impl IntoResponse, DomainError> {
    let owner = owner_id(&headers)?;

    let photo_ids: Vec<i64> = params
        .ids
        .split(',')
        .filter_map(|s| s.trim().parse::<i64>().ok())
        .collect();

    let run = state
        .detect_use_case
        .execute(owner, &photo_ids, params.force.unwrap_or(false))
        .await?;
    Ok(Json(run))
}

#[derive(Deserialize)]
pub struct SaveFaceTagsRequest {
    pub entries: Vec<TagEntry>,
}

async fn save_face_tags_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SaveFaceTagsRequest>,
) -> Result<impl IntoResponse, DomainError> {
    let owner = owner_id(&headers)?;
    let stats = state.save_tags_use_case.execute(owner, &body.entries).await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

async fn list_persons_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, DomainError> {
    let persons = state.persons_use_case.list()?;
    Ok(Json(persons))
}

#[derive(Deserialize)]
pub struct RenamePersonRequest {
    pub name: String,
}

async fn rename_person_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<RenamePersonRequest>,
) -> Result<impl IntoResponse, DomainError> {
    state.persons_use_case.rename(id, &body.name)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_person_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, DomainError> {
    state.persons_use_case.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn person_avatar_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, DomainError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DomainError::InvalidInput(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| DomainError::InvalidInput(e.to_string()))?;

        let url = state.persons_use_case.set_avatar(id, data.to_vec()).await?;
        return Ok(Json(json!({ "url": url })));
    }

    Err(DomainError::InvalidInput("no file field in upload".into()))
}
