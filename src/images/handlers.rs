use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{auth::extractors::AuthUser, state::AppState};

use super::repo::{ImageRecord, ImageStatus};
use super::service::{upload_meal_image, UploadError, UploadRequest};

const PRESIGN_TTL_SECS: u64 = 600;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/images", get(list_images))
        .route("/images/:id", get(get_image))
        .route(
            "/images",
            post(create_image).layer(DefaultBodyLimit::max(20 * 1024 * 1024)),
        )
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub image_id: Uuid,
    pub storage_path: String,
}

#[derive(Debug, Serialize)]
pub struct ImageBody {
    pub id: Uuid,
    pub storage_path: String,
    pub status: ImageStatus,
    pub detected_foods: Option<serde_json::Value>,
    pub created_at: OffsetDateTime,
    pub url: Option<String>,
}

impl ImageBody {
    fn from_record(r: ImageRecord, url: Option<String>) -> Self {
        Self {
            id: r.id,
            storage_path: r.storage_path,
            status: r.status,
            detected_foods: r.detected_foods,
            created_at: r.created_at,
            url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

/// POST /images (multipart, single `file` field): runs the full pipeline.
#[instrument(skip(state, mp))]
pub async fn create_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), (StatusCode, String)> {
    let mut upload: Option<UploadRequest> = None;
    while let Ok(Some(field)) = mp.next_field().await {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(|s| s.to_string());
        let content_type = field.content_type().map(|s| s.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
        upload = Some(UploadRequest {
            bytes,
            content_type,
            file_name,
        });
        break;
    }
    let Some(upload) = upload else {
        return Err((StatusCode::BAD_REQUEST, "file is required".into()));
    };

    let out = upload_meal_image(&state, user_id, upload)
        .await
        .map_err(upload_status)?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            image_id: out.image_id,
            storage_path: out.storage_path,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn list_images(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<ImageBody>>, (StatusCode, String)> {
    let rows = state
        .images
        .list_by_user(user_id, p.limit, p.offset)
        .await
        .map_err(internal)?;
    Ok(Json(
        rows.into_iter()
            .map(|r| ImageBody::from_record(r, None))
            .collect(),
    ))
}

#[instrument(skip(state))]
pub async fn get_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ImageBody>, (StatusCode, String)> {
    let record = state
        .images
        .get_owned(user_id, id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "Image not found".to_string()))?;

    let url = match state
        .storage
        .presign_get(&record.storage_path, PRESIGN_TTL_SECS)
        .await
    {
        Ok(url) => Some(url),
        Err(e) => {
            warn!(image_id = %id, error = %e, "presign failed");
            None
        }
    };

    Ok(Json(ImageBody::from_record(record, url)))
}

fn upload_status(e: UploadError) -> (StatusCode, String) {
    let status = match &e {
        UploadError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
        UploadError::Register(_) | UploadError::Quota(_) => StatusCode::INTERNAL_SERVER_ERROR,
        UploadError::QuotaExhausted => StatusCode::TOO_MANY_REQUESTS,
        UploadError::Classification(_) => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string())
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    tracing::error!(error = %e, "image handler error");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_errors_map_to_distinct_statuses() {
        assert_eq!(
            upload_status(UploadError::Transport("reset".into())).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            upload_status(UploadError::QuotaExhausted).0,
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            upload_status(UploadError::Classification("down".into())).0,
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn image_body_serializes_status_lowercase() {
        let body = ImageBody {
            id: Uuid::new_v4(),
            storage_path: "u/1-2.jpg".into(),
            status: ImageStatus::Done,
            detected_foods: None,
            created_at: OffsetDateTime::now_utc(),
            url: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains(r#""status":"done""#));
    }
}
