use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

use crate::error::RecordError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    #[serde(alias = "Male", alias = "m")]
    Male,
    #[serde(alias = "Female", alias = "f")]
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityLevel {
    #[serde(alias = "Sedentary")]
    Sedentary,
    #[serde(alias = "Lightly Active", alias = "light-active")]
    Light,
    #[serde(alias = "Moderately Active")]
    Moderate,
    #[serde(alias = "Very Active")]
    VeryActive,
    #[serde(alias = "Extremely Active", alias = "extremely-active")]
    ExtraActive,
    /// Anything we do not recognise; scored like a sedentary lifestyle.
    #[serde(other)]
    Unrecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Goal {
    #[serde(alias = "Weight Loss")]
    WeightLoss,
    #[serde(alias = "Weight Gain", alias = "Muscle Gain", alias = "muscle-gain")]
    WeightGain,
    #[serde(other)]
    Maintain,
}

/// Everything the generation prompts are conditioned on. Treated as
/// read-only for the lifetime of a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub age: u32,
    pub sex: Sex,
    pub height_cm: f64,
    pub weight_kg: f64,
    #[serde(default)]
    pub diet_preferences: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    pub activity_level: ActivityLevel,
    pub goal: Goal,
    #[serde(default)]
    pub medical_conditions: Vec<String>,
    /// Weekly grocery budget in local currency.
    pub budget: f64,
}

impl UserProfile {
    pub fn validate(&self) -> Result<(), RecordError> {
        if !(12..=110).contains(&self.age) {
            return Err(RecordError::InvalidProfile(format!(
                "age must be between 12 and 110 (got {})",
                self.age
            )));
        }
        if !(self.height_cm > 0.0) || !(self.weight_kg > 0.0) {
            return Err(RecordError::InvalidProfile(
                "height and weight must be positive".to_string(),
            ));
        }
        if !self.budget.is_finite() || self.budget < 0.0 {
            return Err(RecordError::NegativeBudget(self.budget));
        }
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read profile file '{}'", path.display()))?;
        let profile: UserProfile = serde_json::from_str(&raw)
            .with_context(|| format!("Profile file '{}' is not a valid profile", path.display()))?;
        Ok(profile)
    }
}

#[cfg(test)]
pub(crate) fn sample_profile() -> UserProfile {
    UserProfile {
        age: 30,
        sex: Sex::Male,
        height_cm: 175.0,
        weight_kg: 70.0,
        diet_preferences: vec!["Vegetarian".to_string()],
        allergies: vec!["Peanut".to_string()],
        activity_level: ActivityLevel::Moderate,
        goal: Goal::Maintain,
        medical_conditions: vec![],
        budget: 50.0,
    }
}
