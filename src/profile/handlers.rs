use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::{auth::extractors::AuthUser, state::AppState};

use super::dto::{ProfileBody, ProfileResponse, SaveProfileRequest};
use super::metrics::{age_years, mifflin_st_jeor_bmr, suggest_daily_calories};
use super::repo::{self, Profile};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile))
        .route("/profile", put(save_profile))
}

fn with_metrics(profile: Option<Profile>) -> ProfileResponse {
    let today = OffsetDateTime::now_utc().date();
    let (age, bmr, calorie_target) = match &profile {
        Some(p) => {
            let age = age_years(p.birthdate, today);
            let bmr = mifflin_st_jeor_bmr(p.weight_kg, p.height_cm, age, p.gender);
            let target = bmr.map(|b| suggest_daily_calories(b, p.activity_level));
            (age, bmr, target)
        }
        None => (None, None, None),
    };
    ProfileResponse {
        profile: profile.map(ProfileBody::from),
        age,
        bmr,
        calorie_target,
    }
}

/// Dashboard read: the profile (null until first save) plus derived metrics.
#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    let profile = repo::get_by_user(&state.db, user_id)
        .await
        .map_err(internal)?;
    Ok(Json(with_metrics(profile)))
}

/// Validated upsert; at most one row per account.
#[instrument(skip(state, payload))]
pub async fn save_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<SaveProfileRequest>,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    let valid = match payload.validate() {
        Ok(v) => v,
        Err(msg) => {
            warn!(%user_id, %msg, "profile save rejected");
            return Err((StatusCode::BAD_REQUEST, msg));
        }
    };

    let profile = repo::upsert(&state.db, user_id, &valid)
        .await
        .map_err(internal)?;
    info!(%user_id, "profile saved");
    Ok(Json(with_metrics(Some(profile))))
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    tracing::error!(error = %e, "profile handler error");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
