use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::dto::UserProfile;
use crate::coach::CoachProfile;

#[derive(Debug, FromRow)]
struct ProfileRow {
    name: String,
    age: i32,
    gender: String,
    height_cm: f64,
    weight_kg: f64,
    activity_level: String,
    goal: String,
    target_calories: i32,
    coach: Option<Json<CoachProfile>>,
    onboarding_complete: bool,
}

/// Enum columns are stored as their snake_case wire names.
fn enum_to_text<T: Serialize>(v: &T) -> anyhow::Result<String> {
    match serde_json::to_value(v)? {
        serde_json::Value::String(s) => Ok(s),
        other => anyhow::bail!("enum serialized to non-string {other}"),
    }
}

fn enum_from_text<T: DeserializeOwned>(s: &str) -> anyhow::Result<T> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .with_context(|| format!("unknown enum value `{s}`"))
}

impl TryFrom<ProfileRow> for UserProfile {
    type Error = anyhow::Error;

    fn try_from(r: ProfileRow) -> anyhow::Result<Self> {
        Ok(Self {
            name: r.name,
            age: u32::try_from(r.age).unwrap_or(0),
            gender: enum_from_text(&r.gender)?,
            height_cm: r.height_cm,
            weight_kg: r.weight_kg,
            activity_level: enum_from_text(&r.activity_level)?,
            goal: enum_from_text(&r.goal)?,
            target_calories: r.target_calories,
            coach: r.coach.map(|Json(c)| c),
            onboarding_complete: r.onboarding_complete,
        })
    }
}

pub async fn get(db: &PgPool, user_id: Uuid) -> anyhow::Result<Option<UserProfile>> {
    let row = sqlx::query_as::<_, ProfileRow>(
        r#"
        SELECT name, age, gender, height_cm, weight_kg, activity_level, goal,
               target_calories, coach, onboarding_complete
          FROM profiles
         WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("get profile")?;
    row.map(UserProfile::try_from).transpose()
}

pub async fn upsert(db: &PgPool, user_id: Uuid, p: &UserProfile) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO profiles
            (user_id, name, age, gender, height_cm, weight_kg, activity_level, goal,
             target_calories, coach, onboarding_complete, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now())
        ON CONFLICT (user_id) DO UPDATE SET
            name = EXCLUDED.name,
            age = EXCLUDED.age,
            gender = EXCLUDED.gender,
            height_cm = EXCLUDED.height_cm,
            weight_kg = EXCLUDED.weight_kg,
            activity_level = EXCLUDED.activity_level,
            goal = EXCLUDED.goal,
            target_calories = EXCLUDED.target_calories,
            coach = EXCLUDED.coach,
            onboarding_complete = EXCLUDED.onboarding_complete,
            updated_at = now()
        "#,
    )
    .bind(user_id)
    .bind(&p.name)
    .bind(i32::try_from(p.age).unwrap_or(i32::MAX))
    .bind(enum_to_text(&p.gender)?)
    .bind(p.height_cm)
    .bind(p.weight_kg)
    .bind(enum_to_text(&p.activity_level)?)
    .bind(enum_to_text(&p.goal)?)
    .bind(p.target_calories)
    .bind(p.coach.as_ref().map(Json))
    .bind(p.onboarding_complete)
    .execute(db)
    .await
    .context("upsert profile")?;
    Ok(())
}
