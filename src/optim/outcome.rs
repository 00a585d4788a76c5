use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use super::budget_eval::BudgetVerdict;
use super::workflow::WorkflowState;
use crate::conversation::ConversationState;
use crate::error::WorkflowError;
use crate::grocery::{GroceryList, PricedList, RecipeSet};

pub const GROCERY_LIST_FILE: &str = "grocery_list.json";
pub const PRICED_LIST_FILE: &str = "priced_list.json";
pub const RECIPES_FILE: &str = "recipes.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The priced list fits the budget (recipes attached when enabled).
    Converged,
    /// Iteration cap reached without an acceptable list; best effort attached.
    BudgetUnreachable,
    Failed,
    Cancelled,
}

/// One generate -> price -> route cycle as seen by the router.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleRecord {
    pub cycle: u32,
    pub generation_accepted: bool,
    /// None when no list had been generated yet.
    pub verdict: Option<BudgetVerdict>,
}

#[derive(Debug)]
pub struct WorkflowOutcome {
    pub status: RunStatus,
    pub final_state: WorkflowState,
    pub cycles: u32,
    /// Every state entered, in order, starting with `Generating`.
    pub trace: Vec<WorkflowState>,
    pub grocery_list: Option<GroceryList>,
    /// Last successfully computed priced list, even on failure.
    pub priced_list: Option<PricedList>,
    pub recipes: Option<RecipeSet>,
    pub conversation: ConversationState,
    pub history: Vec<CycleRecord>,
    pub error: Option<WorkflowError>,
}

impl WorkflowOutcome {
    pub fn budget_unreachable(&self) -> bool {
        self.status == RunStatus::BudgetUnreachable
    }

    /// Writes each available artifact to its own JSON file in `dir`.
    pub async fn write_artifacts(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create output directory {:?}", dir))?;

        let mut written = Vec::new();
        if let Some(list) = &self.grocery_list {
            written.push(write_json(dir, GROCERY_LIST_FILE, list).await?);
        }
        if let Some(priced) = &self.priced_list {
            written.push(write_json(dir, PRICED_LIST_FILE, priced).await?);
        }
        if let Some(recipes) = &self.recipes {
            written.push(write_json(dir, RECIPES_FILE, recipes).await?);
        }
        info!(files = written.len(), dir = %dir.display(), "artifacts written");
        Ok(written)
    }
}

async fn write_json<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> Result<PathBuf> {
    let path = dir.join(file_name);
    let body = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", file_name))?;
    fs::write(&path, body)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}
