use serde::{Deserialize, Serialize};

use super::energy;
use crate::coach::CoachProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    WeightLoss,
    MuscleGain,
    Maintenance,
}

impl Goal {
    pub const fn describe(&self) -> &'static str {
        match self {
            Goal::WeightLoss => "lose weight",
            Goal::MuscleGain => "gain muscle",
            Goal::Maintenance => "maintain their weight",
        }
    }
}

/// Physiological inputs a user edits; everything else is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRequest {
    pub name: String,
    pub age: u32,
    pub gender: Gender,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub activity_level: ActivityLevel,
    pub goal: Goal,
    #[serde(default)]
    pub onboarding_complete: bool,
    /// Style hint for the first coach, used only when none is assigned yet.
    #[serde(default)]
    pub coach_style: Option<String>,
}

impl ProfileRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.name.trim().is_empty() {
            return Err("name is required");
        }
        if !(1..=120).contains(&self.age) {
            return Err("age must be between 1 and 120");
        }
        if !(50.0..=260.0).contains(&self.height_cm) {
            return Err("height_cm must be between 50 and 260");
        }
        if !(20.0..=400.0).contains(&self.weight_kg) {
            return Err("weight_kg must be between 20 and 400");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub age: u32,
    pub gender: Gender,
    pub height_cm: f64,
    pub weight_kg: f64,
    pub activity_level: ActivityLevel,
    pub goal: Goal,
    pub target_calories: i32,
    pub coach: Option<CoachProfile>,
    pub onboarding_complete: bool,
}

impl UserProfile {
    /// Builds a profile from edited fields, keeping the given coach.
    pub fn from_request(req: &ProfileRequest, coach: Option<CoachProfile>) -> Self {
        let mut p = Self {
            name: req.name.trim().to_string(),
            age: req.age,
            gender: req.gender,
            height_cm: req.height_cm,
            weight_kg: req.weight_kg,
            activity_level: req.activity_level,
            goal: req.goal,
            target_calories: 0,
            coach,
            onboarding_complete: req.onboarding_complete,
        };
        p.recompute_target();
        p
    }

    pub fn recompute_target(&mut self) {
        self.target_calories = energy::target_calories(
            self.gender,
            self.age,
            self.height_cm,
            self.weight_kg,
            self.activity_level,
            self.goal,
        );
    }

    /// The assigned coach, or the built-in one.
    pub fn active_coach(&self) -> CoachProfile {
        self.coach.clone().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct RegenerateCoachRequest {
    #[serde(default)]
    pub style_hint: Option<String>,
}

#[cfg(test)]
pub(crate) fn sample_profile() -> UserProfile {
    UserProfile::from_request(
        &ProfileRequest {
            name: "Yui".into(),
            age: 30,
            gender: Gender::Female,
            height_cm: 162.0,
            weight_kg: 58.0,
            activity_level: ActivityLevel::Light,
            goal: Goal::WeightLoss,
            onboarding_complete: true,
            coach_style: None,
        },
        None,
    )
}
