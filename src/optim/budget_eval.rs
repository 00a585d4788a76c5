use serde::{Deserialize, Serialize};

use crate::grocery::PricedList;
use crate::pricing::RawPrice;

/// Numeric prices pass through; strings keep only digits and '.' before
/// parsing. Anything unparsable is 0.0.
pub fn normalize_price(raw: &RawPrice) -> f64 {
    match raw {
        RawPrice::Amount(value) if value.is_finite() => *value,
        RawPrice::Amount(_) => 0.0,
        RawPrice::Text(text) => {
            let cleaned: String = text
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            cleaned.parse::<f64>().unwrap_or(0.0)
        }
    }
}

/// How far above the budget a total may go and still be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum OverageTolerance {
    /// Fraction of the budget, e.g. 0.10 for 10%.
    Relative(f64),
    /// Fixed currency amount added to the budget.
    Flat(f64),
}

impl Default for OverageTolerance {
    fn default() -> Self {
        OverageTolerance::Relative(0.10)
    }
}

impl OverageTolerance {
    pub fn threshold(&self, budget: f64) -> f64 {
        match self {
            OverageTolerance::Relative(fraction) => budget * (1.0 + fraction),
            OverageTolerance::Flat(amount) => budget + amount,
        }
    }
}

/// Item the generator is asked to swap for something cheaper.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubstitutionTarget {
    pub index: usize,
    pub name: String,
    pub unit_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum BudgetVerdict {
    Converged {
        total_price: f64,
        threshold: f64,
    },
    OverBudget {
        total_price: f64,
        threshold: f64,
        target: SubstitutionTarget,
    },
}

impl BudgetVerdict {
    pub fn is_converged(&self) -> bool {
        matches!(self, BudgetVerdict::Converged { .. })
    }

    pub fn total_price(&self) -> f64 {
        match self {
            BudgetVerdict::Converged { total_price, .. } | BudgetVerdict::OverBudget { total_price, .. } => {
                *total_price
            }
        }
    }

    pub fn threshold(&self) -> f64 {
        match self {
            BudgetVerdict::Converged { threshold, .. } | BudgetVerdict::OverBudget { threshold, .. } => *threshold,
        }
    }
}

/// Most expensive strictly-positive unit price; the first one wins ties.
pub fn most_expensive_item(priced: &PricedList) -> Option<SubstitutionTarget> {
    let mut best: Option<SubstitutionTarget> = None;
    for (index, item) in priced.items().iter().enumerate() {
        let Some(price) = item.unit_price.filter(|p| *p > 0.0) else {
            continue;
        };
        if best.as_ref().map_or(true, |b| price > b.unit_price) {
            best = Some(SubstitutionTarget {
                index,
                name: item.name.clone(),
                unit_price: price,
            });
        }
    }
    best
}

pub fn evaluate_budget(priced: &PricedList, budget: f64, tolerance: OverageTolerance) -> BudgetVerdict {
    let total_price = priced.total_price();
    let threshold = tolerance.threshold(budget);

    if total_price <= threshold {
        return BudgetVerdict::Converged { total_price, threshold };
    }

    match most_expensive_item(priced) {
        Some(target) => BudgetVerdict::OverBudget {
            total_price,
            threshold,
            target,
        },
        // Nothing left to substitute; accept rather than loop on unusable data.
        None => BudgetVerdict::Converged { total_price, threshold },
    }
}
