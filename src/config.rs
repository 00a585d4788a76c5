use anyhow::{anyhow, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::api_connection::endpoints::{DEFAULT_MODEL, OPENROUTER_CHAT_URL};
use crate::optim::budget_eval::OverageTolerance;
use crate::pricing::LineTotalPolicy;

pub const API_KEY_ENV_VAR: &str = "OPENROUTER_API_KEY";

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;
pub const DEFAULT_SERVICE_TIMEOUT: Duration = Duration::from_secs(60);

/// Knobs of the budget loop.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowConfig {
    /// Cap on generate -> price -> route cycles.
    pub max_iterations: u32,
    pub tolerance: OverageTolerance,
    pub recipes_enabled: bool,
    /// Applied to every completion and lookup call.
    pub service_timeout: Duration,
    pub line_total_policy: LineTotalPolicy,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: OverageTolerance::default(),
            recipes_enabled: true,
            service_timeout: DEFAULT_SERVICE_TIMEOUT,
            line_total_policy: LineTotalPolicy::PriceOnly,
        }
    }
}

fn env_override<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("Invalid value '{}' for {}", raw, name)),
        _ => Ok(None),
    }
}

/// Percent and flat tolerances are mutually exclusive, as on the command line.
fn tolerance_override(percent: Option<f64>, flat: Option<f64>) -> Result<Option<OverageTolerance>> {
    match (percent, flat) {
        (Some(_), Some(_)) => Err(anyhow!(
            "GROCERY_TOLERANCE_PERCENT and GROCERY_TOLERANCE_FLAT cannot both be set"
        )),
        (Some(percent), None) => Ok(Some(OverageTolerance::Relative(percent / 100.0))),
        (None, Some(flat)) => Ok(Some(OverageTolerance::Flat(flat))),
        (None, None) => Ok(None),
    }
}

impl WorkflowConfig {
    /// Defaults overridden by `GROCERY_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(max) = env_override::<u32>("GROCERY_MAX_ITERATIONS")? {
            config.max_iterations = max;
        }
        let percent = env_override::<f64>("GROCERY_TOLERANCE_PERCENT")?;
        let flat = env_override::<f64>("GROCERY_TOLERANCE_FLAT")?;
        if let Some(tolerance) = tolerance_override(percent, flat)? {
            config.tolerance = tolerance;
        }
        if let Some(enabled) = env_override::<bool>("GROCERY_ENABLE_RECIPES")? {
            config.recipes_enabled = enabled;
        }
        if let Some(secs) = env_override::<u64>("GROCERY_SERVICE_TIMEOUT_SECS")? {
            config.service_timeout = Duration::from_secs(secs);
        }
        if let Some(true) = env_override::<bool>("GROCERY_MULTIPLY_QUANTITY")? {
            config.line_total_policy = LineTotalPolicy::MultiplyQuantity;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be at least 1"));
        }
        let tolerance_value = match self.tolerance {
            OverageTolerance::Relative(v) | OverageTolerance::Flat(v) => v,
        };
        if !tolerance_value.is_finite() || tolerance_value < 0.0 {
            return Err(anyhow!("overage tolerance must be a non-negative number"));
        }
        if self.service_timeout.is_zero() {
            return Err(anyhow!("service timeout must be positive"));
        }
        Ok(())
    }
}

/// Settings for the OpenRouter-backed completion service.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub model: String,
    pub base_url: String,
    pub api_key_env_var: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the API for a JSON object response.
    pub json_mode: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: OPENROUTER_CHAT_URL.to_string(),
            api_key_env_var: API_KEY_ENV_VAR.to_string(),
            temperature: 0.2,
            max_tokens: 2048,
            json_mode: false,
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(model) = env::var("OPENROUTER_MODEL") {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }
        if let Ok(url) = env::var("OPENROUTER_BASE_URL") {
            if !url.trim().is_empty() {
                config.base_url = url.trim().to_string();
            }
        }
        if let Some(temperature) = env_override::<f32>("OPENROUTER_TEMPERATURE")? {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = env_override::<u32>("OPENROUTER_MAX_TOKENS")? {
            config.max_tokens = max_tokens;
        }
        if let Some(json_mode) = env_override::<bool>("OPENROUTER_JSON_MODE")? {
            config.json_mode = json_mode;
        }
        Ok(config)
    }
}
