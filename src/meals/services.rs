use time::Date;
use uuid::Uuid;

use super::dto::{round_macro, DailySummary, MealLog};
use super::repo;
use crate::clock;
use crate::state::AppState;

/// Resolves an optional `YYYY-MM-DD` query value; absent means today.
pub fn resolve_day(st: &AppState, raw: Option<&str>) -> Result<Date, String> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(st.now().date()),
        Some(s) => clock::parse_ymd(s).ok_or_else(|| format!("invalid date `{s}`")),
    }
}

pub async fn meals_on(st: &AppState, user_id: Uuid, day: Date) -> anyhow::Result<Vec<MealLog>> {
    let (start, end) = clock::day_bounds_ms(day, st.config.utc_offset());
    repo::list_between(&st.db, user_id, start, end).await
}

pub fn summarize(day: Date, target_calories: i32, meals: &[MealLog]) -> DailySummary {
    let calories: i32 = meals.iter().map(|m| m.calories).sum();
    let sum = |f: fn(&MealLog) -> f64| round_macro(meals.iter().map(f).sum());
    DailySummary {
        date: clock::format_ymd(day),
        target_calories,
        calories,
        protein: sum(|m: &MealLog| m.protein),
        fat: sum(|m: &MealLog| m.fat),
        carbs: sum(|m: &MealLog| m.carbs),
        remaining_calories: target_calories - calories,
        meal_count: meals.len(),
    }
}
