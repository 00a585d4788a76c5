use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{ProviderConfig, WorkflowConfig};
use crate::optim::budget_eval::OverageTolerance;
use crate::pricing::LineTotalPolicy;

#[derive(Parser, Debug)]
#[command(author, version, about = "Generates a weekly grocery list that fits a budget", long_about = None)]
pub struct Cli {
    /// Path to the user profile JSON file
    #[arg(short, long)]
    pub profile: PathBuf,

    /// Path to the scraped price catalog JSON file
    #[arg(short, long)]
    pub catalog: PathBuf,

    /// Overrides the budget stored in the profile
    #[arg(short, long)]
    pub budget: Option<f64>,

    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Accepted overage as a percentage of the budget
    #[arg(long, conflicts_with = "tolerance_flat")]
    pub tolerance_percent: Option<f64>,

    /// Accepted overage as a fixed amount above the budget
    #[arg(long)]
    pub tolerance_flat: Option<f64>,

    /// Stop once the list fits, without writing recipes
    #[arg(long)]
    pub no_recipes: bool,

    /// Multiply unit prices by the digits of each quantity
    #[arg(long)]
    pub multiply_quantity: bool,

    /// Timeout for each completion or lookup call
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// OpenRouter model name
    #[arg(short, long)]
    pub model: Option<String>,

    /// Directory receiving the JSON artifacts
    #[arg(short, long, default_value = "output")]
    pub output_dir: PathBuf,
}

impl Cli {
    /// Command-line flags win over environment settings.
    pub fn apply_to(&self, config: &mut WorkflowConfig) {
        if let Some(max) = self.max_iterations {
            config.max_iterations = max;
        }
        if let Some(percent) = self.tolerance_percent {
            config.tolerance = OverageTolerance::Relative(percent / 100.0);
        }
        if let Some(flat) = self.tolerance_flat {
            config.tolerance = OverageTolerance::Flat(flat);
        }
        if self.no_recipes {
            config.recipes_enabled = false;
        }
        if self.multiply_quantity {
            config.line_total_policy = LineTotalPolicy::MultiplyQuantity;
        }
        if let Some(secs) = self.timeout_secs {
            config.service_timeout = Duration::from_secs(secs);
        }
    }

    pub fn apply_to_provider(&self, config: &mut ProviderConfig) {
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
    }
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
