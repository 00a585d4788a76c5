pub mod catalog;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::error::LookupUnavailableError;
use crate::grocery::{GroceryList, PricedItem, PricedList};
use crate::optim::budget_eval::normalize_price;

pub use catalog::PriceCatalog;

/// A price as scraped: either already numeric or a currency string like "$3.49".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPrice {
    Amount(f64),
    Text(String),
}

impl From<f64> for RawPrice {
    fn from(value: f64) -> Self {
        RawPrice::Amount(value)
    }
}

impl From<&str> for RawPrice {
    fn from(value: &str) -> Self {
        RawPrice::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub unit_price: RawPrice,
    #[serde(default)]
    pub url: String,
}

/// Store price source. Keys of the returned map are lowercased item names;
/// an absent key means "not found", not an error.
#[async_trait]
pub trait PriceLookupService: Send + Sync {
    async fn lookup(
        &self,
        item_names: &[String],
    ) -> Result<HashMap<String, PriceQuote>, LookupUnavailableError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineTotalPolicy {
    /// Line total is the unit price alone.
    #[default]
    PriceOnly,
    /// Line total is the unit price times the digits found in the quantity text.
    MultiplyQuantity,
}

/// Digits of the quantity text read as one number: "2 lbs" -> 2, "1.5 kg" -> 15,
/// no digits -> 1.
pub fn naive_quantity_multiplier(quantity: &str) -> f64 {
    let digits: String = quantity.chars().filter(char::is_ascii_digit).collect();
    digits.parse::<f64>().unwrap_or(1.0)
}

/// Joins a list against lookup results, one priced item per grocery item, in order.
pub fn price_grocery_list(
    list: &GroceryList,
    quotes: &HashMap<String, PriceQuote>,
    policy: LineTotalPolicy,
) -> PricedList {
    let items = list
        .items
        .iter()
        .map(|item| {
            let Some(quote) = quotes.get(&item.name.to_lowercase()) else {
                return PricedItem::not_found(item);
            };
            let unit_price = normalize_price(&quote.unit_price);
            let line_total = match policy {
                LineTotalPolicy::PriceOnly => unit_price,
                LineTotalPolicy::MultiplyQuantity => unit_price * naive_quantity_multiplier(&item.quantity),
            };
            PricedItem::found(item, unit_price, line_total, Some(quote.url.clone())).unwrap_or_else(|err| {
                warn!(item = %item.name, error = %err, "discarding unusable price quote");
                PricedItem::not_found(item)
            })
        })
        .collect();

    PricedList::new(items, list.budget)
}
