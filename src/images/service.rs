//! Upload pipeline: storage put, record registration, quota consumption and
//! classification, in that order. Whatever happens after registration, the
//! record lands in a terminal status before the pipeline returns.

use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::quota::QuotaKey;
use crate::state::AppState;

const DEFAULT_EXT: &str = "jpg";

pub struct UploadRequest {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Uploaded {
    pub image_id: Uuid,
    pub storage_path: String,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload failed: {0}")]
    Transport(String),
    #[error("could not register image: {0}")]
    Register(String),
    #[error("image quota exhausted")]
    QuotaExhausted,
    #[error("quota check failed: {0}")]
    Quota(String),
    #[error("classification failed: {0}")]
    Classification(String),
}

/// Move one captured photo through upload, registration, quota enforcement
/// and classification. No retries anywhere; the caller gets either the new
/// record's identity or the reason the chain stopped.
#[instrument(skip(st, req), fields(size = req.bytes.len()))]
pub async fn upload_meal_image(
    st: &AppState,
    user_id: Uuid,
    req: UploadRequest,
) -> Result<Uploaded, UploadError> {
    let ext = req
        .file_name
        .as_deref()
        .and_then(file_ext)
        .unwrap_or(DEFAULT_EXT);
    let storage_path = storage_key(user_id, ext);
    let content_type = req
        .content_type
        .unwrap_or_else(|| mime_from_ext(ext).to_string());

    st.storage
        .put_object(&storage_path, req.bytes, &content_type)
        .await
        .map_err(|e| UploadError::Transport(e.to_string()))?;

    // Registration failure leaves the blob orphaned; cleanup is a separate
    // job's concern.
    let image_id = st
        .images
        .insert_uploaded(user_id, &storage_path)
        .await
        .map_err(|e| {
            warn!(%user_id, %storage_path, error = %e, "image registration failed, blob orphaned");
            UploadError::Register(e.to_string())
        })?;

    match st.quota.consume(user_id, QuotaKey::Image, 1).await {
        Ok(true) => {}
        Ok(false) => {
            fail_record(st, image_id).await;
            return Err(UploadError::QuotaExhausted);
        }
        Err(e) => {
            fail_record(st, image_id).await;
            return Err(UploadError::Quota(e.to_string()));
        }
    }

    let foods = match st.classifier.classify(image_id, &storage_path).await {
        Ok(foods) => foods,
        Err(e) => {
            fail_record(st, image_id).await;
            return Err(UploadError::Classification(e.to_string()));
        }
    };

    if let Err(e) = st.images.mark_done(image_id, &foods).await {
        fail_record(st, image_id).await;
        return Err(UploadError::Register(e.to_string()));
    }

    info!(%user_id, %image_id, foods = foods.len(), "image classified");
    Ok(Uploaded {
        image_id,
        storage_path,
    })
}

async fn fail_record(st: &AppState, image_id: Uuid) {
    if let Err(e) = st.images.mark_failed(image_id).await {
        error!(%image_id, error = %e, "could not mark image failed");
    }
}

fn storage_key(user_id: Uuid, ext: &str) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    format!("{}/{}-{}.{}", user_id, millis, Uuid::new_v4(), ext)
}

fn file_ext(name: &str) -> Option<&str> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 5)
}

fn mime_from_ext(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{DetectedFood, FoodClassifier};
    use crate::images::repo::{ImageRecord, ImageStatus, ImageStore};
    use crate::quota::QuotaLedger;
    use crate::storage::StorageClient;
    use axum::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    struct MemStorage {
        objects: Mutex<HashMap<String, String>>,
        fail: bool,
    }

    impl MemStorage {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                objects: Mutex::new(HashMap::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                objects: Mutex::new(HashMap::new()),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl StorageClient for MemStorage {
        async fn put_object(
            &self,
            key: &str,
            _body: Bytes,
            content_type: &str,
        ) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("connection reset");
            }
            let mut objects = self.objects.lock().unwrap();
            anyhow::ensure!(!objects.contains_key(key), "key already exists");
            objects.insert(key.to_string(), content_type.to_string());
            Ok(())
        }

        async fn presign_get(&self, key: &str, _seconds: u64) -> anyhow::Result<String> {
            Ok(format!("https://fake.local/{}", key))
        }
    }

    struct MemImages {
        rows: Mutex<HashMap<Uuid, ImageRecord>>,
        fail_insert: bool,
    }

    impl MemImages {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                rows: Mutex::new(HashMap::new()),
                fail_insert: false,
            })
        }

        fn failing_insert() -> Arc<Self> {
            Arc::new(Self {
                rows: Mutex::new(HashMap::new()),
                fail_insert: true,
            })
        }

        fn only_row(&self) -> ImageRecord {
            let rows = self.rows.lock().unwrap();
            assert_eq!(rows.len(), 1);
            rows.values().next().unwrap().clone()
        }

        fn is_empty(&self) -> bool {
            self.rows.lock().unwrap().is_empty()
        }
    }

    #[async_trait]
    impl ImageStore for MemImages {
        async fn insert_uploaded(
            &self,
            user_id: Uuid,
            storage_path: &str,
        ) -> anyhow::Result<Uuid> {
            if self.fail_insert {
                anyhow::bail!("insert rejected");
            }
            let id = Uuid::new_v4();
            self.rows.lock().unwrap().insert(
                id,
                ImageRecord {
                    id,
                    user_id,
                    storage_path: storage_path.to_string(),
                    status: ImageStatus::Uploaded,
                    detected_foods: None,
                    created_at: OffsetDateTime::now_utc(),
                },
            );
            Ok(id)
        }

        async fn mark_done(&self, image_id: Uuid, foods: &[DetectedFood]) -> anyhow::Result<()> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.get_mut(&image_id).expect("row exists");
            row.status = ImageStatus::Done;
            row.detected_foods = Some(serde_json::to_value(foods)?);
            Ok(())
        }

        async fn mark_failed(&self, image_id: Uuid) -> anyhow::Result<()> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.get_mut(&image_id).expect("row exists");
            row.status = ImageStatus::Failed;
            Ok(())
        }

        async fn get_owned(
            &self,
            user_id: Uuid,
            image_id: Uuid,
        ) -> anyhow::Result<Option<ImageRecord>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .get(&image_id)
                .filter(|r| r.user_id == user_id)
                .cloned())
        }

        async fn list_by_user(
            &self,
            user_id: Uuid,
            _limit: i64,
            _offset: i64,
        ) -> anyhow::Result<Vec<ImageRecord>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .values()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect())
        }
    }

    struct FixedQuota(bool);

    #[async_trait]
    impl QuotaLedger for FixedQuota {
        async fn consume(
            &self,
            _user_id: Uuid,
            _key: QuotaKey,
            _amount: i32,
        ) -> anyhow::Result<bool> {
            Ok(self.0)
        }
    }

    struct FakeClassifier {
        foods: Option<Vec<DetectedFood>>,
        called: AtomicBool,
    }

    impl FakeClassifier {
        fn ok(foods: Vec<DetectedFood>) -> Arc<Self> {
            Arc::new(Self {
                foods: Some(foods),
                called: AtomicBool::new(false),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                foods: None,
                called: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl FoodClassifier for FakeClassifier {
        async fn classify(
            &self,
            _image_id: Uuid,
            _storage_path: &str,
        ) -> anyhow::Result<Vec<DetectedFood>> {
            self.called.store(true, Ordering::SeqCst);
            match &self.foods {
                Some(foods) => Ok(foods.clone()),
                None => anyhow::bail!("model unavailable"),
            }
        }
    }

    fn rice() -> Vec<DetectedFood> {
        vec![DetectedFood {
            name: "Arroz".into(),
            confidence: 0.85,
        }]
    }

    fn request() -> UploadRequest {
        UploadRequest {
            bytes: Bytes::from_static(b"fake image bytes"),
            content_type: Some("image/jpeg".into()),
            file_name: Some("lunch.jpg".into()),
        }
    }

    fn state_with(
        storage: Arc<MemStorage>,
        images: Arc<MemImages>,
        quota_granted: bool,
        classifier: Arc<FakeClassifier>,
    ) -> AppState {
        AppState {
            storage,
            images,
            quota: Arc::new(FixedQuota(quota_granted)),
            classifier,
            ..AppState::fake()
        }
    }

    #[tokio::test]
    async fn happy_path_lands_in_done_with_exact_foods() {
        let images = MemImages::new();
        let classifier = FakeClassifier::ok(rice());
        let st = state_with(MemStorage::new(), images.clone(), true, classifier);
        let user_id = Uuid::new_v4();

        let out = upload_meal_image(&st, user_id, request())
            .await
            .expect("pipeline ok");

        let row = images.only_row();
        assert_eq!(row.id, out.image_id);
        assert_eq!(row.storage_path, out.storage_path);
        assert_eq!(row.status, ImageStatus::Done);
        assert_eq!(
            row.detected_foods,
            Some(serde_json::to_value(rice()).unwrap())
        );
        assert!(out.storage_path.starts_with(&user_id.to_string()));
        assert!(out.storage_path.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn quota_denied_marks_failed_and_skips_classifier() {
        let images = MemImages::new();
        let classifier = FakeClassifier::ok(rice());
        let st = state_with(MemStorage::new(), images.clone(), false, classifier.clone());

        let err = upload_meal_image(&st, Uuid::new_v4(), request())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::QuotaExhausted));
        assert_eq!(images.only_row().status, ImageStatus::Failed);
        assert!(!classifier.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn classifier_error_marks_failed_and_propagates_message() {
        let images = MemImages::new();
        let st = state_with(MemStorage::new(), images.clone(), true, FakeClassifier::failing());

        let err = upload_meal_image(&st, Uuid::new_v4(), request())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("model unavailable"));
        assert_eq!(images.only_row().status, ImageStatus::Failed);
    }

    #[tokio::test]
    async fn transport_failure_creates_no_record() {
        let images = MemImages::new();
        let classifier = FakeClassifier::ok(rice());
        let st = state_with(MemStorage::failing(), images.clone(), true, classifier.clone());

        let err = upload_meal_image(&st, Uuid::new_v4(), request())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Transport(_)));
        assert!(images.is_empty());
        assert!(!classifier.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn registration_failure_aborts_before_quota() {
        let images = MemImages::failing_insert();
        let classifier = FakeClassifier::ok(rice());
        let st = state_with(MemStorage::new(), images.clone(), true, classifier.clone());

        let err = upload_meal_image(&st, Uuid::new_v4(), request())
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Register(_)));
        assert!(!classifier.called.load(Ordering::SeqCst));
    }

    #[test]
    fn extension_comes_from_filename_with_jpg_fallback() {
        assert_eq!(file_ext("photo.jpeg"), Some("jpeg"));
        assert_eq!(file_ext("a.b.PNG"), Some("PNG"));
        assert_eq!(file_ext("noext"), None);
        assert_eq!(file_ext("trailingdot."), None);
    }

    #[test]
    fn content_type_inferred_from_extension() {
        assert_eq!(mime_from_ext("jpg"), "image/jpeg");
        assert_eq!(mime_from_ext("JPEG"), "image/jpeg");
        assert_eq!(mime_from_ext("png"), "image/png");
        assert_eq!(mime_from_ext("webp"), "image/webp");
        assert_eq!(mime_from_ext("bin"), "application/octet-stream");
    }

    #[test]
    fn storage_keys_do_not_collide() {
        let user_id = Uuid::new_v4();
        let a = storage_key(user_id, "jpg");
        let b = storage_key(user_id, "jpg");
        assert_ne!(a, b);
        assert!(a.starts_with(&format!("{}/", user_id)));
    }
}
