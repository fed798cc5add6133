use crate::application::crop;
use crate::domain::{
    AssetStore, DomainError, FaceDetector, ImageFetcher, PersonRegistry, Photo, PhotoLedger,
    StagedCrop, TaggedPhotoSummary, TaggingRun,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Cap on concurrent per-photo pipelines. Deliberate backpressure so a big
/// batch cannot overwhelm the detection and storage APIs.
pub const DEFAULT_DETECT_WORKERS: usize = 3;

/// First half of the tagging workflow: decide which photos need work, then
/// detect, crop and stage every face so a human can put names to them.
///
/// The second half (turning those names into durable records) is
/// [`super::SaveFaceTagsUseCase`]; the two share nothing but the database.
pub struct DetectFacesUseCase {
    ledger: Arc<dyn PhotoLedger>,
    registry: Arc<dyn PersonRegistry>,
    detector: Arc<dyn FaceDetector>,
    fetcher: Arc<dyn ImageFetcher>,
    store: Arc<dyn AssetStore>,
    workers: usize,
}

impl DetectFacesUseCase {
    pub fn new(
        ledger: Arc<dyn PhotoLedger>,
        registry: Arc<dyn PersonRegistry>,
        detector: Arc<dyn FaceDetector>,
        fetcher: Arc<dyn ImageFetcher>,
        store: Arc<dyn AssetStore>,
        workers: usize,
    ) -> Self {
        Self {
            ledger,
            registry,
            detector,
            fetcher,
            store,
            workers: workers.max(1),
        }
    }

    pub async fn execute(
        &self,
        owner_id: i64,
        photo_ids: &[i64],
        force: bool,
    ) -> Result<TaggingRun, DomainError> {
        if photo_ids.is_empty() {
            return Err(DomainError::InvalidInput("no photo ids supplied".into()));
        }

        let photos = self.ledger.find_photos(owner_id, photo_ids)?;
        if photos.is_empty() {
            return Err(DomainError::InvalidInput(
                "no matching photos for this owner".into(),
            ));
        }

        // Partition: photos with existing associations are only reprocessed
        // when forced. Everything else enters the pipeline.
        let (already_tagged, to_process): (Vec<Photo>, Vec<Photo>) = photos
            .into_iter()
            .partition(|p| !p.needs_tagging() && !force);

        let summaries = self.summarize(&already_tagged)?;
        let skipped = summaries.len();

        if to_process.is_empty() {
            // Nothing left to do; return the summary without touching the
            // detection service at all.
            info!(skipped, "all requested photos already tagged");
            return Ok(TaggingRun {
                staged: Vec::new(),
                already_tagged: summaries,
                processed: 0,
                skipped,
            });
        }

        let processed = to_process.len();
        info!(
            photos = processed,
            workers = self.workers,
            "starting face detection batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for photo in to_process {
            let semaphore = semaphore.clone();
            let detector = self.detector.clone();
            let fetcher = self.fetcher.clone();
            let store = self.store.clone();

            tasks.spawn(async move {
                // Closed only on shutdown; a dropped permit is fine here.
                let _permit = semaphore.acquire_owned().await;
                process_photo(photo, detector, fetcher, store).await
            });
        }

        // Collect in completion order; ordering across photos is not part of
        // the contract, indices within a photo are.
        let mut staged = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(crops) => staged.extend(crops),
                Err(e) => warn!("photo pipeline task panicked: {}", e),
            }
        }

        info!(faces = staged.len(), processed, skipped, "face detection batch done");

        Ok(TaggingRun {
            staged,
            already_tagged: summaries,
            processed,
            skipped,
        })
    }

    fn summarize(&self, photos: &[Photo]) -> Result<Vec<TaggedPhotoSummary>, DomainError> {
        photos
            .iter()
            .map(|p| {
                Ok(TaggedPhotoSummary {
                    photo_id: p.id,
                    photo_name: p.name.clone(),
                    photo_url: p.url.clone(),
                    person_names: self.registry.person_names(&p.person_ids)?,
                })
            })
            .collect()
    }
}

/// Detect + crop + stage for one photo. Never fails the batch: every error
/// is logged with enough context to diagnose and the face (or the whole
/// photo) is simply left out of the result.
async fn process_photo(
    photo: Photo,
    detector: Arc<dyn FaceDetector>,
    fetcher: Arc<dyn ImageFetcher>,
    store: Arc<dyn AssetStore>,
) -> Vec<StagedCrop> {
    let faces = match detector.detect(&photo.url).await {
        Ok(faces) => faces,
        Err(e) => {
            warn!(photo_id = photo.id, "face detection failed: {}", e);
            return Vec::new();
        }
    };

    if faces.is_empty() {
        info!(photo_id = photo.id, "no faces detected");
        return Vec::new();
    }

    // One fetch per photo; every face is cropped from the same bytes.
    let image_bytes = match fetcher.fetch(&photo.url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(photo_id = photo.id, "failed to fetch source image: {}", e);
            return Vec::new();
        }
    };

    let mut staged = Vec::with_capacity(faces.len());
    for (index, face) in faces.into_iter().enumerate() {
        let jpeg = match crop::crop_face(&image_bytes, &face.rect) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                warn!(photo_id = photo.id, face_index = index, "crop failed: {}", e);
                continue;
            }
        };

        match store.stage_crop(jpeg).await {
            Ok(asset) => staged.push(StagedCrop {
                photo_id: photo.id,
                photo_name: photo.name.clone(),
                face_index: index,
                face_token: face.face_token,
                crop_url: asset.url,
                crop_public_id: asset.public_id,
            }),
            Err(e) => {
                warn!(photo_id = photo.id, face_index = index, "staging failed: {}", e);
            }
        }
    }

    staged
}
