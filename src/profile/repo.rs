use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::metrics::{ActivityLevel, Gender};

#[derive(Debug, Clone, FromRow)]
pub struct Profile {
    pub user_id: Uuid,
    pub full_name: String,
    pub gender: Option<Gender>,
    pub birthdate: Option<Date>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub activity_level: Option<ActivityLevel>,
    pub goal_weight: Option<f64>,
    pub preferences: Option<serde_json::Value>,
    pub updated_at: OffsetDateTime,
}

/// Validated payload for a profile save. Required fields are concrete here;
/// only the genuinely optional ones stay `Option`.
#[derive(Debug, Clone)]
pub struct ProfileUpsert {
    pub full_name: String,
    pub gender: Gender,
    pub birthdate: Date,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub activity_level: ActivityLevel,
    pub goal_weight: Option<f64>,
    pub preferences: Option<serde_json::Value>,
}

pub async fn get_by_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Option<Profile>> {
    let row = sqlx::query_as::<_, Profile>(
        r#"
        SELECT user_id, full_name, gender, birthdate, height_cm, weight_kg,
               activity_level, goal_weight, preferences, updated_at
        FROM profiles
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Insert-or-update keyed by the owning account.
pub async fn upsert(db: &PgPool, user_id: Uuid, p: &ProfileUpsert) -> anyhow::Result<Profile> {
    let row = sqlx::query_as::<_, Profile>(
        r#"
        INSERT INTO profiles
            (user_id, full_name, gender, birthdate, height_cm, weight_kg,
             activity_level, goal_weight, preferences, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
        ON CONFLICT (user_id) DO UPDATE SET
            full_name = EXCLUDED.full_name,
            gender = EXCLUDED.gender,
            birthdate = EXCLUDED.birthdate,
            height_cm = EXCLUDED.height_cm,
            weight_kg = EXCLUDED.weight_kg,
            activity_level = EXCLUDED.activity_level,
            goal_weight = EXCLUDED.goal_weight,
            preferences = EXCLUDED.preferences,
            updated_at = now()
        RETURNING user_id, full_name, gender, birthdate, height_cm, weight_kg,
                  activity_level, goal_weight, preferences, updated_at
        "#,
    )
    .bind(user_id)
    .bind(&p.full_name)
    .bind(p.gender)
    .bind(p.birthdate)
    .bind(p.height_cm)
    .bind(p.weight_kg)
    .bind(p.activity_level)
    .bind(p.goal_weight)
    .bind(&p.preferences)
    .fetch_one(db)
    .await?;
    Ok(row)
}
