use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::metrics::{ActivityLevel, CalorieTarget, Gender};
use super::repo::{Profile, ProfileUpsert};

const ISO_DATE: &[time::format_description::FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

/// Form payload for a profile save. Everything is optional at the wire level
/// so that missing fields surface as validation messages, not 422s.
#[derive(Debug, Deserialize)]
pub struct SaveProfileRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub gender: Option<Gender>,
    /// ISO date, yyyy-mm-dd.
    #[serde(default)]
    pub birthdate: Option<String>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub activity_level: Option<ActivityLevel>,
    #[serde(default)]
    pub goal_weight: Option<f64>,
    #[serde(default)]
    pub preferences: Option<serde_json::Value>,
}

impl SaveProfileRequest {
    /// Check the form before any remote call; the first violation wins.
    pub fn validate(self) -> Result<ProfileUpsert, String> {
        let full_name = self.full_name.trim().to_string();
        if full_name.chars().count() < 2 {
            return Err("Full name must be at least 2 characters.".into());
        }
        let Some(gender) = self.gender else {
            return Err("Select a gender.".into());
        };
        let Some(birthdate) = self.birthdate.as_deref() else {
            return Err("Birthdate is required.".into());
        };
        let birthdate = Date::parse(birthdate, ISO_DATE)
            .map_err(|_| "Birthdate must be an ISO date (yyyy-mm-dd).".to_string())?;
        let height_cm = match self.height_cm {
            Some(h) if h > 0.0 => h,
            _ => return Err("Height in cm must be greater than zero.".into()),
        };
        let weight_kg = match self.weight_kg {
            Some(w) if w > 0.0 => w,
            _ => return Err("Weight in kg must be greater than zero.".into()),
        };
        let Some(activity_level) = self.activity_level else {
            return Err("Select an activity level.".into());
        };
        Ok(ProfileUpsert {
            full_name,
            gender,
            birthdate,
            height_cm,
            weight_kg,
            activity_level,
            goal_weight: self.goal_weight,
            preferences: self.preferences,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileBody {
    pub user_id: Uuid,
    pub full_name: String,
    pub gender: Option<Gender>,
    pub birthdate: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub activity_level: Option<ActivityLevel>,
    pub goal_weight: Option<f64>,
    pub preferences: Option<serde_json::Value>,
    pub updated_at: OffsetDateTime,
}

impl From<Profile> for ProfileBody {
    fn from(p: Profile) -> Self {
        Self {
            user_id: p.user_id,
            full_name: p.full_name,
            birthdate: p.birthdate.and_then(|d| d.format(ISO_DATE).ok()),
            gender: p.gender,
            height_cm: p.height_cm,
            weight_kg: p.weight_kg,
            activity_level: p.activity_level,
            goal_weight: p.goal_weight,
            preferences: p.preferences,
            updated_at: p.updated_at,
        }
    }
}

/// Profile plus derived metrics; each metric is null when inputs are
/// incomplete.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub profile: Option<ProfileBody>,
    pub age: Option<i32>,
    pub bmr: Option<i32>,
    pub calorie_target: Option<CalorieTarget>,
}
