use super::detect_faces::DetectFacesUseCase;
use crate::domain::{
    AssetStore, BoundingBox, DetectedFace, DomainError, FaceDetector, ImageFetcher, PhotoLedger,
    StagedAsset,
};
use crate::infrastructure::SqliteRepository;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([120, 90, 60]));
    let mut out = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

fn face(token: &str, left: i64, top: i64, width: i64, height: i64) -> DetectedFace {
    DetectedFace {
        face_token: token.to_string(),
        rect: BoundingBox {
            left,
            top,
            width,
            height,
        },
    }
}

struct MockDetector {
    faces_by_url: HashMap<String, Vec<DetectedFace>>,
    calls: AtomicUsize,
}

impl MockDetector {
    fn new(faces_by_url: HashMap<String, Vec<DetectedFace>>) -> Self {
        Self {
            faces_by_url,
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FaceDetector for MockDetector {
    async fn detect(&self, image_url: &str) -> Result<Vec<DetectedFace>, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.faces_by_url.get(image_url).cloned().unwrap_or_default())
    }

    async fn thumbnail(&self, _face_token: &str) -> Result<Vec<u8>, DomainError> {
        Err(DomainError::Detection("not expected in this test".into()))
    }
}

struct MockFetcher {
    bytes: Vec<u8>,
}

#[async_trait]
impl ImageFetcher for MockFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, DomainError> {
        Ok(self.bytes.clone())
    }
}

/// Staging store counting uploads, optionally failing one of them.
struct MockStore {
    staged: AtomicUsize,
    fail_on_call: Option<usize>,
}

impl MockStore {
    fn new() -> Self {
        Self {
            staged: AtomicUsize::new(0),
            fail_on_call: None,
        }
    }

    fn failing_on(call: usize) -> Self {
        Self {
            staged: AtomicUsize::new(0),
            fail_on_call: Some(call),
        }
    }
}

#[async_trait]
impl AssetStore for MockStore {
    async fn stage_crop(&self, _jpeg: Vec<u8>) -> Result<StagedAsset, DomainError> {
        let n = self.staged.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_call == Some(n) {
            return Err(DomainError::Staging("injected staging failure".into()));
        }
        Ok(StagedAsset {
            url: format!("https://cdn.test/temp_faces/crop_{}.jpg", n),
            public_id: format!("temp_faces/crop_{}", n),
        })
    }

    async fn promote_crop(
        &self,
        _source_url: &str,
        _temp_public_id: &str,
        _person_name: &str,
    ) -> Result<String, DomainError> {
        Err(DomainError::Staging("not expected in this test".into()))
    }

    async fn upload_avatar(
        &self,
        _jpeg: Vec<u8>,
        _person_name: &str,
    ) -> Result<String, DomainError> {
        Err(DomainError::Staging("not expected in this test".into()))
    }

    async fn upload_photo(&self, _bytes: Vec<u8>, _name: &str) -> Result<StagedAsset, DomainError> {
        Err(DomainError::Staging("not expected in this test".into()))
    }

    async fn delete_by_url(&self, _url: &str) -> Result<(), DomainError> {
        Ok(())
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    repo: Arc<SqliteRepository>,
    detector: Arc<MockDetector>,
    store: Arc<MockStore>,
    use_case: DetectFacesUseCase,
}

fn fixture(faces_by_url: HashMap<String, Vec<DetectedFace>>, store: MockStore) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");
    let repo = Arc::new(SqliteRepository::new(path.to_str().unwrap()).unwrap());
    let detector = Arc::new(MockDetector::new(faces_by_url));
    let store = Arc::new(store);
    let fetcher = Arc::new(MockFetcher {
        bytes: png_bytes(200, 160),
    });

    let use_case = DetectFacesUseCase::new(
        repo.clone(),
        repo.clone(),
        detector.clone(),
        fetcher,
        store.clone(),
        3,
    );

    Fixture {
        _dir: dir,
        repo,
        detector,
        store,
        use_case,
    }
}

#[tokio::test]
async fn rejects_empty_and_unknown_ids() {
    let f = fixture(HashMap::new(), MockStore::new());

    assert!(matches!(
        f.use_case.execute(1, &[], false).await,
        Err(DomainError::InvalidInput(_))
    ));
    assert!(matches!(
        f.use_case.execute(1, &[999], false).await,
        Err(DomainError::InvalidInput(_))
    ));
    assert_eq!(f.detector.call_count(), 0);
}

#[tokio::test]
async fn already_tagged_photos_skip_detection_entirely() {
    let f = fixture(HashMap::new(), MockStore::new());
    use crate::domain::PersonRegistry;

    let photo = f.repo.insert_photo(1, "wedding", "https://img/w.jpg").unwrap();
    let alice = f.repo.create_person("Alice", None).unwrap();
    f.repo.merge_photo_persons(photo.id, 1, &[alice.id]).unwrap();

    let run = f.use_case.execute(1, &[photo.id], false).await.unwrap();

    assert_eq!(run.processed, 0);
    assert_eq!(run.skipped, 1);
    assert!(run.staged.is_empty());
    assert_eq!(run.already_tagged.len(), 1);
    assert_eq!(run.already_tagged[0].person_names, vec!["Alice".to_string()]);
    assert_eq!(f.detector.call_count(), 0);
}

#[tokio::test]
async fn partitions_tagged_from_untagged() {
    let f = fixture(HashMap::new(), MockStore::new());
    use crate::domain::PersonRegistry;

    let alice = f.repo.create_person("Alice", None).unwrap();
    let mut ids = Vec::new();
    for i in 0..5 {
        let photo = f
            .repo
            .insert_photo(1, &format!("p{}", i), &format!("https://img/{}.jpg", i))
            .unwrap();
        if i < 2 {
            f.repo.merge_photo_persons(photo.id, 1, &[alice.id]).unwrap();
        }
        ids.push(photo.id);
    }

    let run = f.use_case.execute(1, &ids, false).await.unwrap();

    assert_eq!(run.processed, 3);
    assert_eq!(run.skipped, 2);
    assert_eq!(f.detector.call_count(), 3);
}

#[tokio::test]
async fn stages_one_crop_per_detected_face() {
    let mut faces = HashMap::new();
    faces.insert(
        "https://img/two.jpg".to_string(),
        vec![face("tok-a", 10, 10, 50, 50), face("tok-b", 100, 40, 60, 60)],
    );
    faces.insert("https://img/none.jpg".to_string(), Vec::new());

    let f = fixture(faces, MockStore::new());
    let two = f.repo.insert_photo(1, "two faces", "https://img/two.jpg").unwrap();
    let none = f.repo.insert_photo(1, "no faces", "https://img/none.jpg").unwrap();

    let run = f.use_case.execute(1, &[two.id, none.id], false).await.unwrap();

    assert_eq!(run.processed, 2);
    assert_eq!(run.skipped, 0);
    assert_eq!(run.staged.len(), 2);

    let mut staged = run.staged.clone();
    staged.sort_by_key(|c| c.face_index);
    assert_eq!(staged[0].photo_id, two.id);
    assert_eq!(staged[0].face_index, 0);
    assert_eq!(staged[0].face_token, "tok-a");
    assert_eq!(staged[1].face_index, 1);
    assert_eq!(staged[1].face_token, "tok-b");
    assert!(staged.iter().all(|c| c.crop_url.contains("temp_faces")));
}

#[tokio::test]
async fn staging_failure_drops_only_that_face() {
    let mut faces = HashMap::new();
    faces.insert(
        "https://img/three.jpg".to_string(),
        vec![
            face("tok-1", 5, 5, 40, 40),
            face("tok-2", 60, 5, 40, 40),
            face("tok-3", 115, 5, 40, 40),
        ],
    );

    let f = fixture(faces, MockStore::failing_on(1));
    let photo = f.repo.insert_photo(1, "group", "https://img/three.jpg").unwrap();

    let run = f.use_case.execute(1, &[photo.id], false).await.unwrap();

    assert_eq!(run.processed, 1);
    assert_eq!(run.staged.len(), 2);
    assert_eq!(f.store.staged.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn force_reprocesses_tagged_photos() {
    let mut faces = HashMap::new();
    faces.insert(
        "https://img/f.jpg".to_string(),
        vec![face("tok-f", 20, 20, 50, 50)],
    );

    let f = fixture(faces, MockStore::new());
    use crate::domain::PersonRegistry;

    let photo = f.repo.insert_photo(1, "forced", "https://img/f.jpg").unwrap();
    let alice = f.repo.create_person("Alice", None).unwrap();
    f.repo.merge_photo_persons(photo.id, 1, &[alice.id]).unwrap();

    let run = f.use_case.execute(1, &[photo.id], true).await.unwrap();

    assert_eq!(run.processed, 1);
    assert_eq!(run.skipped, 0);
    assert_eq!(run.staged.len(), 1);
    assert_eq!(f.detector.call_count(), 1);
}
