use serde::{Deserialize, Serialize};

use crate::error::RecordError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryItem {
    pub name: String,
    /// Free text including a unit, e.g. "2 lbs". Never parsed into units.
    pub quantity: String,
}

impl GroceryItem {
    pub fn new(name: impl Into<String>, quantity: impl Into<String>) -> Result<Self, RecordError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(RecordError::MissingName);
        }
        Ok(Self {
            name,
            quantity: quantity.into().trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryList {
    pub items: Vec<GroceryItem>,
    pub budget: f64,
}

impl GroceryList {
    pub fn new(items: Vec<GroceryItem>, budget: f64) -> Result<Self, RecordError> {
        if !budget.is_finite() || budget < 0.0 {
            return Err(RecordError::NegativeBudget(budget));
        }
        if items.is_empty() {
            return Err(RecordError::EmptyList);
        }
        Ok(Self { items, budget })
    }

    pub fn item_names(&self) -> Vec<String> {
        self.items.iter().map(|item| item.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedItem {
    pub name: String,
    pub quantity: String,
    pub unit_price: Option<f64>,
    pub line_total: Option<f64>,
    pub url: Option<String>,
}

impl PricedItem {
    pub fn found(
        item: &GroceryItem,
        unit_price: f64,
        line_total: f64,
        url: Option<String>,
    ) -> Result<Self, RecordError> {
        for price in [unit_price, line_total] {
            if !price.is_finite() || price < 0.0 {
                return Err(RecordError::NegativePrice {
                    name: item.name.clone(),
                    price,
                });
            }
        }
        Ok(Self {
            name: item.name.clone(),
            quantity: item.quantity.clone(),
            unit_price: Some(unit_price),
            line_total: Some(line_total),
            url: url.filter(|u| !u.is_empty()),
        })
    }

    pub fn not_found(item: &GroceryItem) -> Self {
        Self {
            name: item.name.clone(),
            quantity: item.quantity.clone(),
            unit_price: None,
            line_total: None,
            url: None,
        }
    }

    pub fn is_priced(&self) -> bool {
        self.unit_price.is_some()
    }
}

/// Priced counterpart of a [`GroceryList`]. The total is computed at
/// construction and cannot drift from the items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricedList {
    items: Vec<PricedItem>,
    total_price: f64,
    budget: f64,
    missing_items: Vec<String>,
}

impl PricedList {
    pub fn new(items: Vec<PricedItem>, budget: f64) -> Self {
        let total_price = items.iter().filter_map(|item| item.line_total).sum();
        let missing_items = items
            .iter()
            .filter(|item| !item.is_priced())
            .map(|item| item.name.clone())
            .collect();
        Self {
            items,
            total_price,
            budget,
            missing_items,
        }
    }

    pub fn items(&self) -> &[PricedItem] {
        &self.items
    }

    pub fn total_price(&self) -> f64 {
        self.total_price
    }

    pub fn budget(&self) -> f64 {
        self.budget
    }

    /// Names of items the lookup service could not price.
    pub fn missing_items(&self) -> &[String] {
        &self.missing_items
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|item| item.name.eq_ignore_ascii_case(name.trim()))
    }
}

// Mirrors the per-meal nutrition block the recipe prompt asks for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionalSummary {
    #[serde(default)]
    pub kcal: Option<f32>,
    #[serde(default)]
    pub protein_g: Option<f32>,
    #[serde(default)]
    pub carbohydrate_g: Option<f32>,
    #[serde(default)]
    pub fat_g: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    pub name: String,
    pub quantity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub ingredients: Vec<RecipeIngredient>,
    pub instructions: Vec<String>,
    #[serde(default)]
    pub nutrition: NutritionalSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeSet {
    pub recipes: Vec<Recipe>,
}

impl RecipeSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}
