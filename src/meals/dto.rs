use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One recorded eating event. `timestamp` is epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealLog {
    pub id: Uuid,
    pub timestamp: i64,
    pub name: String,
    pub calories: i32,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_message: Option<String>,
}

/// Nearest whole kcal; negative and non-finite values become zero.
pub fn round_calories(v: f64) -> i32 {
    if !v.is_finite() || v <= 0.0 {
        return 0;
    }
    v.round().min(i32::MAX as f64) as i32
}

/// Nearest 0.1 g; negative and non-finite values become zero.
pub fn round_macro(v: f64) -> f64 {
    if !v.is_finite() || v <= 0.0 {
        return 0.0;
    }
    (v * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nutrition {
    pub name: String,
    pub calories: i32,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
}

impl Nutrition {
    pub fn normalized(name: &str, calories: f64, protein: f64, fat: f64, carbs: f64) -> Self {
        Self {
            name: name.trim().to_string(),
            calories: round_calories(calories),
            protein: round_macro(protein),
            fat: round_macro(fat),
            carbs: round_macro(carbs),
        }
    }
}

/// Partial edit of a meal or a pending proposal. Values are normalized
/// the same way extraction output is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MealEdit {
    pub name: Option<String>,
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub carbs: Option<f64>,
}

impl MealEdit {
    pub fn apply(&self, meal: &mut MealLog) {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            meal.name = name.to_string();
        }
        if let Some(v) = self.calories {
            meal.calories = round_calories(v);
        }
        if let Some(v) = self.protein {
            meal.protein = round_macro(v);
        }
        if let Some(v) = self.fat {
            meal.fat = round_macro(v);
        }
        if let Some(v) = self.carbs {
            meal.carbs = round_macro(v);
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MealView {
    #[serde(flatten)]
    pub meal: MealLog,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct DailySummary {
    pub date: String,
    pub target_calories: i32,
    pub calories: i32,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub remaining_calories: i32,
    pub meal_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calories_round_to_integer_and_clamp() {
        assert_eq!(round_calories(249.5), 250);
        assert_eq!(round_calories(249.4), 249);
        assert_eq!(round_calories(-12.0), 0);
        assert_eq!(round_calories(f64::NAN), 0);
    }

    #[test]
    fn macros_keep_one_decimal() {
        for (input, expected) in [(12.345, 12.3), (0.05, 0.1), (7.0, 7.0), (-3.2, 0.0), (1.26, 1.3)] {
            let got = round_macro(input);
            assert_eq!(got, expected, "input {input}");
            let scaled = got * 10.0;
            assert!((scaled - scaled.round()).abs() < 1e-9);
        }
    }

    #[test]
    fn edit_applies_only_present_fields() {
        let mut meal = MealLog {
            id: Uuid::new_v4(),
            timestamp: 0,
            name: "Rice".into(),
            calories: 250,
            protein: 4.0,
            fat: 0.5,
            carbs: 55.0,
            image_ref: None,
            confirmation_message: None,
        };
        MealEdit {
            name: Some("  ".into()),
            calories: Some(300.4),
            fat: Some(-1.0),
            ..Default::default()
        }
        .apply(&mut meal);
        assert_eq!(meal.name, "Rice");
        assert_eq!(meal.calories, 300);
        assert_eq!(meal.fat, 0.0);
        assert_eq!(meal.carbs, 55.0);
    }
}
