use super::dto::{ActivityLevel, Gender, Goal};

/// Below this the app will not suggest a daily budget.
pub const MIN_TARGET_KCAL: i32 = 1200;

/// Mifflin-St Jeor resting energy in kcal/day.
pub fn bmr(gender: Gender, age: u32, height_cm: f64, weight_kg: f64) -> f64 {
    let sex_term = match gender {
        Gender::Male => 5.0,
        Gender::Female => -161.0,
        Gender::Other => -78.0,
    };
    10.0 * weight_kg + 6.25 * height_cm - 5.0 * f64::from(age) + sex_term
}

pub fn activity_factor(level: ActivityLevel) -> f64 {
    match level {
        ActivityLevel::Sedentary => 1.2,
        ActivityLevel::Light => 1.375,
        ActivityLevel::Moderate => 1.55,
        ActivityLevel::Active => 1.725,
    }
}

pub fn goal_adjustment(goal: Goal) -> f64 {
    match goal {
        Goal::WeightLoss => -500.0,
        Goal::MuscleGain => 300.0,
        Goal::Maintenance => 0.0,
    }
}

/// Goal-adjusted TDEE, the user's daily calorie budget.
pub fn target_calories(
    gender: Gender,
    age: u32,
    height_cm: f64,
    weight_kg: f64,
    activity: ActivityLevel,
    goal: Goal,
) -> i32 {
    let tdee = bmr(gender, age, height_cm, weight_kg) * activity_factor(activity);
    let target = (tdee + goal_adjustment(goal)).round();
    if !target.is_finite() {
        return MIN_TARGET_KCAL;
    }
    (target as i32).max(MIN_TARGET_KCAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn male_moderate_maintenance() {
        // 10*70 + 6.25*175 - 5*30 + 5 = 1648.75; * 1.55 = 2555.5625
        let kcal = target_calories(
            Gender::Male,
            30,
            175.0,
            70.0,
            ActivityLevel::Moderate,
            Goal::Maintenance,
        );
        assert_eq!(kcal, 2556);
    }

    #[test]
    fn female_sedentary_weight_loss() {
        // 10*55 + 6.25*160 - 5*40 - 161 = 1189; * 1.2 = 1426.8; - 500 = 926.8 -> floor
        let kcal = target_calories(
            Gender::Female,
            40,
            160.0,
            55.0,
            ActivityLevel::Sedentary,
            Goal::WeightLoss,
        );
        assert_eq!(kcal, MIN_TARGET_KCAL);
    }

    #[test]
    fn muscle_gain_adds_surplus() {
        let base = target_calories(Gender::Other, 25, 180.0, 80.0, ActivityLevel::Active, Goal::Maintenance);
        let bulk = target_calories(Gender::Other, 25, 180.0, 80.0, ActivityLevel::Active, Goal::MuscleGain);
        assert_eq!(bulk - base, 300);
    }
}
