//! Prompt text for the generator, the budget router and the recipe stage.

use crate::grocery::PricedList;
use crate::optim::budget_eval::SubstitutionTarget;
use crate::profile::{ActivityLevel, Goal, UserProfile};

fn list_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "none".to_string()
    } else {
        values.join(", ")
    }
}

fn activity_label(level: ActivityLevel) -> &'static str {
    match level {
        ActivityLevel::Sedentary | ActivityLevel::Unrecognized => "sedentary",
        ActivityLevel::Light => "lightly active",
        ActivityLevel::Moderate => "moderately active",
        ActivityLevel::VeryActive => "very active",
        ActivityLevel::ExtraActive => "extremely active",
    }
}

fn goal_label(goal: Goal) -> &'static str {
    match goal {
        Goal::WeightLoss => "weight loss",
        Goal::WeightGain => "weight gain",
        Goal::Maintain => "weight maintenance",
    }
}

fn dietary_constraints(profile: &UserProfile, calorie_target: u32) -> String {
    format!(
        "- Daily calorie target: about {} kcal
- Diet preferences: {}
- Allergies (never include these): {}
- Medical conditions: {}
- Goal: {}",
        calorie_target,
        list_or_none(&profile.diet_preferences),
        list_or_none(&profile.allergies),
        list_or_none(&profile.medical_conditions),
        goal_label(profile.goal),
    )
}

pub fn grocery_list_instruction(profile: &UserProfile, calorie_target: u32) -> String {
    format!(
        "You are a grocery list generator. Create a list of grocery items with quantities for one person for one week.
The quantities MUST include units (e.g., \"2 lbs\", \"1 gallon\", \"500g\", \"3 pieces\").
Respect every constraint below:
{}
- Weekly budget: ${:.2}

If a later message asks you to replace an item, return the complete revised list, not just the change.
Respond ONLY with a JSON object with this structure:
{{
    \"items\": [{{\"name\": \"item_name\", \"quantity\": \"quantity with unit\"}}],
    \"budget\": budget_amount
}}",
        dietary_constraints(profile, calorie_target),
        profile.budget,
    )
}

pub fn opening_request(profile: &UserProfile) -> String {
    format!(
        "User profile: age {}, {:?}, height {:.0} cm, weight {:.0} kg, {}.
Generate a grocery list for a single person for one week based on a budget of ${:.2}.",
        profile.age,
        profile.sex,
        profile.height_cm,
        profile.weight_kg,
        activity_label(profile.activity_level),
        profile.budget,
    )
}

pub fn over_budget_feedback(total_price: f64, threshold: f64, target: &SubstitutionTarget) -> String {
    format!(
        "The total price ${:.2} is over budget threshold (${:.2}). Please replace {} (${:.2}/unit) with a cheaper alternative.",
        total_price, threshold, target.name, target.unit_price
    )
}

pub fn recipe_instruction(profile: &UserProfile, calorie_target: u32) -> String {
    format!(
        "You are a meal planner. Write simple recipes that use ONLY the grocery items you are given.
Respect every constraint below:
{}

Respond ONLY with a JSON object with this structure:
{{
    \"recipes\": [{{
        \"name\": \"recipe name\",
        \"ingredients\": [{{\"name\": \"grocery item name exactly as given\", \"quantity\": \"amount with unit\"}}],
        \"instructions\": [\"step 1\", \"step 2\"],
        \"nutrition\": {{\"kcal\": 0, \"protein_g\": 0, \"carbohydrate_g\": 0, \"fat_g\": 0}}
    }}]
}}",
        dietary_constraints(profile, calorie_target),
    )
}

pub fn recipe_request(priced: &PricedList) -> String {
    let items = priced
        .items()
        .iter()
        .map(|item| format!("- {} ({})", item.name, item.quantity))
        .collect::<Vec<String>>()
        .join("\n");
    format!("Grocery items available for this week:\n{}\n\nWrite recipes using only these items.", items)
}
