use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use super::{PriceLookupService, PriceQuote, RawPrice};
use crate::error::LookupUnavailableError;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    ingredients: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    name: String,
    price: RawPrice,
    #[serde(default)]
    url: Option<String>,
}

/// Scraped store prices held in memory, keyed by lowercased item name.
#[derive(Debug, Clone, Default)]
pub struct PriceCatalog {
    entries: HashMap<String, PriceQuote>,
}

impl PriceCatalog {
    pub fn from_quotes<I, S>(quotes: I) -> Self
    where
        I: IntoIterator<Item = (S, PriceQuote)>,
        S: AsRef<str>,
    {
        let entries = quotes
            .into_iter()
            .map(|(name, quote)| (name.as_ref().trim().to_lowercase(), quote))
            .collect();
        Self { entries }
    }

    /// Reads a `{"ingredients": [{"name", "price", "url"}]}` file.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read price catalog at {:?}", path))?;
        let file: CatalogFile = serde_json::from_str(&raw)
            .with_context(|| format!("Price catalog at {:?} is malformed", path))?;

        let catalog = Self::from_quotes(
            file.ingredients
                .into_iter()
                .filter(|entry| !entry.name.trim().is_empty())
                .map(|entry| {
                    let quote = PriceQuote {
                        unit_price: entry.price,
                        url: entry.url.unwrap_or_default(),
                    };
                    (entry.name, quote)
                }),
        );
        if catalog.is_empty() {
            return Err(anyhow::anyhow!("No priced ingredients loaded from {:?}", path));
        }
        info!(entries = catalog.len(), "price catalog loaded");
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PriceLookupService for PriceCatalog {
    async fn lookup(
        &self,
        item_names: &[String],
    ) -> Result<HashMap<String, PriceQuote>, LookupUnavailableError> {
        let found: HashMap<String, PriceQuote> = item_names
            .iter()
            .map(|name| name.trim().to_lowercase())
            .filter_map(|key| self.entries.get(&key).cloned().map(|quote| (key, quote)))
            .collect();
        debug!(requested = item_names.len(), found = found.len(), "catalog lookup");
        Ok(found)
    }
}
