mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use application::{
    DetectFacesUseCase, ManagePersonsUseCase, SaveFaceTagsUseCase, UploadPhotoUseCase,
    DEFAULT_DETECT_WORKERS,
};
use infrastructure::{
    CloudinaryConfig, CloudinaryStore, FaceppClient, FaceppConfig, HttpImageFetcher,
    SqliteRepository,
};
use presentation::{app_router, AppState};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Configuration
    let db_path = env_or("DATABASE_PATH", "famfoto.db");
    let port: u16 = env_or("PORT", "3000").parse()?;
    let detect_workers: usize = env_or("DETECT_WORKERS", "")
        .parse()
        .unwrap_or(DEFAULT_DETECT_WORKERS);

    let facepp_config = FaceppConfig::new(
        env_or("FACEPP_API_KEY", ""),
        env_or("FACEPP_API_SECRET", ""),
    );
    let cloudinary_config = CloudinaryConfig::new(
        env_or("CLOUDINARY_CLOUD_NAME", ""),
        env_or("CLOUDINARY_API_KEY", ""),
        env_or("CLOUDINARY_API_SECRET", ""),
    );

    // Initialize Infrastructure
    tracing::info!("Initializing database at {}", db_path);
    let repo = Arc::new(SqliteRepository::new(&db_path)?);

    let detector = Arc::new(FaceppClient::new(facepp_config)?);
    let fetcher = Arc::new(HttpImageFetcher::new()?);
    let store = Arc::new(CloudinaryStore::new(cloudinary_config)?);

    // Initialize Use Cases
    let detect_use_case = Arc::new(DetectFacesUseCase::new(
        repo.clone(),
        repo.clone(),
        detector.clone(),
        fetcher,
        store.clone(),
        detect_workers,
    ));

    let save_tags_use_case = Arc::new(SaveFaceTagsUseCase::new(
        repo.clone(),
        repo.clone(),
        detector,
        store.clone(),
    ));

    let persons_use_case = Arc::new(ManagePersonsUseCase::new(repo.clone(), store.clone()));

    let upload_use_case = Arc::new(UploadPhotoUseCase::new(repo, store));

    let state = AppState {
        detect_use_case,
        save_tags_use_case,
        persons_use_case,
        upload_use_case,
    };

    let app = axum::Router::new()
        .nest("/api", app_router(state))
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024)) // 25MB uploads
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
