use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::MalformedGenerationError;
use crate::grocery::{GroceryItem, GroceryList, PricedList, RecipeSet};

/// Strips a ```json ... ``` or ``` ... ``` fence wrapping the whole text.
/// Text that is not fully fenced comes back unchanged (apart from trimming).
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .and_then(|rest| rest.strip_suffix("```"))
        .or_else(|| {
            trimmed
                .strip_prefix("```")
                .and_then(|rest| rest.strip_suffix("```"))
        })
        .map(str::trim)
        .unwrap_or(trimmed)
}

pub fn parse_json_value(content: &str) -> Result<Value, MalformedGenerationError> {
    let content_str = strip_code_fence(content);
    if content_str.is_empty() {
        return Err(MalformedGenerationError::Empty);
    }
    serde_json::from_str(content_str).map_err(|e| {
        debug!(error = %e, content = %content_str, "completion is not JSON");
        MalformedGenerationError::InvalidJson(e.to_string())
    })
}

/// Parses a completion into `T`, telling syntax errors apart from schema errors.
pub fn parse_generation<T: DeserializeOwned>(content: &str) -> Result<T, MalformedGenerationError> {
    let value = parse_json_value(content)?;
    serde_json::from_value(value).map_err(|e| MalformedGenerationError::Schema(e.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuantityText {
    Text(String),
    Number(f64),
}

impl QuantityText {
    fn into_string(self) -> String {
        match self {
            QuantityText::Text(text) => text,
            QuantityText::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedItem {
    name: String,
    quantity: QuantityText,
}

#[derive(Debug, Deserialize)]
struct GeneratedList {
    items: Vec<GeneratedItem>,
    #[serde(default)]
    budget: Option<f64>,
}

/// The budget of the returned list is always `budget`; the model's echo of
/// it is only logged when it disagrees.
pub fn parse_grocery_list(content: &str, budget: f64) -> Result<GroceryList, MalformedGenerationError> {
    let generated: GeneratedList = parse_generation(content)?;
    if let Some(echoed) = generated.budget.filter(|b| (b - budget).abs() > f64::EPSILON) {
        debug!(echoed, budget, "generator echoed a different budget");
    }

    let items = generated
        .items
        .into_iter()
        .map(|item| GroceryItem::new(item.name, item.quantity.into_string()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(GroceryList::new(items, budget)?)
}

/// Parses recipes and drops ingredients that are not on the priced list;
/// recipes left without ingredients are dropped too.
pub fn parse_recipe_set(content: &str, priced: &PricedList) -> Result<RecipeSet, MalformedGenerationError> {
    let mut set: RecipeSet = parse_generation(content)?;
    for recipe in set.recipes.iter_mut() {
        let recipe_name = recipe.name.clone();
        recipe.ingredients.retain(|ingredient| {
            let known = priced.contains(&ingredient.name);
            if !known {
                warn!(recipe = %recipe_name, ingredient = %ingredient.name, "dropping ingredient not on the grocery list");
            }
            known
        });
    }
    set.recipes.retain(|recipe| !recipe.ingredients.is_empty());
    Ok(set)
}
