use crate::profile::{ActivityLevel, Goal, Sex, UserProfile};

/// Basal metabolic rate in kcal/day from the revised Harris-Benedict equations
/// (Roza & Shizgal, 1984).
pub fn basal_metabolic_rate(sex: Sex, weight_kg: f64, height_cm: f64, age: u32) -> f64 {
    let age = f64::from(age);
    match sex {
        Sex::Male => 88.362 + 13.397 * weight_kg + 4.799 * height_cm - 5.677 * age,
        Sex::Female => 447.593 + 9.247 * weight_kg + 3.098 * height_cm - 4.330 * age,
    }
}

pub fn activity_factor(level: ActivityLevel) -> f64 {
    match level {
        ActivityLevel::Sedentary => 1.2,
        ActivityLevel::Light => 1.375,
        ActivityLevel::Moderate => 1.55,
        ActivityLevel::VeryActive => 1.725,
        ActivityLevel::ExtraActive => 1.9,
        ActivityLevel::Unrecognized => 1.2,
    }
}

pub fn goal_factor(goal: Goal) -> f64 {
    match goal {
        Goal::WeightLoss => 0.8,
        Goal::WeightGain => 1.2,
        Goal::Maintain => 1.0,
    }
}

/// Daily calorie target used as a textual constraint in generation prompts.
pub fn daily_calorie_target(profile: &UserProfile) -> u32 {
    let bmr = basal_metabolic_rate(profile.sex, profile.weight_kg, profile.height_cm, profile.age);
    let target = bmr * activity_factor(profile.activity_level) * goal_factor(profile.goal);
    target.round().max(0.0) as u32
}
