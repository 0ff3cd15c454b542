use anyhow::Context;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::dto::MealLog;

#[derive(Debug, FromRow)]
struct MealRow {
    id: Uuid,
    logged_at_ms: i64,
    name: String,
    calories: i32,
    protein_g: f64,
    fat_g: f64,
    carbs_g: f64,
    image_ref: Option<String>,
    confirmation_message: Option<String>,
}

impl From<MealRow> for MealLog {
    fn from(r: MealRow) -> Self {
        Self {
            id: r.id,
            timestamp: r.logged_at_ms,
            name: r.name,
            calories: r.calories,
            protein: r.protein_g,
            fat: r.fat_g,
            carbs: r.carbs_g,
            image_ref: r.image_ref,
            confirmation_message: r.confirmation_message,
        }
    }
}

const COLUMNS: &str = "id, logged_at_ms, name, calories, protein_g, fat_g, carbs_g, \
                       image_ref, confirmation_message";

pub async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    meal: &MealLog,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO meal_logs
            (id, user_id, logged_at_ms, name, calories, protein_g, fat_g, carbs_g,
             image_ref, confirmation_message)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(meal.id)
    .bind(user_id)
    .bind(meal.timestamp)
    .bind(&meal.name)
    .bind(meal.calories)
    .bind(meal.protein)
    .bind(meal.fat)
    .bind(meal.carbs)
    .bind(&meal.image_ref)
    .bind(&meal.confirmation_message)
    .execute(&mut **tx)
    .await
    .context("insert meal_log")?;
    Ok(())
}

pub async fn get(db: &PgPool, user_id: Uuid, meal_id: Uuid) -> anyhow::Result<Option<MealLog>> {
    let row = sqlx::query_as::<_, MealRow>(&format!(
        "SELECT {COLUMNS} FROM meal_logs WHERE id = $1 AND user_id = $2"
    ))
    .bind(meal_id)
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("get meal_log")?;
    Ok(row.map(Into::into))
}

/// Meals with `start_ms <= logged_at_ms < end_ms`, oldest first.
pub async fn list_between(
    db: &PgPool,
    user_id: Uuid,
    start_ms: i64,
    end_ms: i64,
) -> anyhow::Result<Vec<MealLog>> {
    let rows = sqlx::query_as::<_, MealRow>(&format!(
        "SELECT {COLUMNS} FROM meal_logs \
         WHERE user_id = $1 AND logged_at_ms >= $2 AND logged_at_ms < $3 \
         ORDER BY logged_at_ms ASC"
    ))
    .bind(user_id)
    .bind(start_ms)
    .bind(end_ms)
    .fetch_all(db)
    .await
    .context("list meal_logs")?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn update(db: &PgPool, user_id: Uuid, meal: &MealLog) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"
        UPDATE meal_logs
           SET name = $3, calories = $4, protein_g = $5, fat_g = $6, carbs_g = $7
         WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(meal.id)
    .bind(user_id)
    .bind(&meal.name)
    .bind(meal.calories)
    .bind(meal.protein)
    .bind(meal.fat)
    .bind(meal.carbs)
    .execute(db)
    .await
    .context("update meal_log")?;
    Ok(res.rows_affected() == 1)
}

pub async fn delete(db: &PgPool, user_id: Uuid, meal_id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM meal_logs WHERE id = $1 AND user_id = $2")
        .bind(meal_id)
        .bind(user_id)
        .execute(db)
        .await
        .context("delete meal_log")?;
    Ok(res.rows_affected() == 1)
}
