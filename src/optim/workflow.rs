use serde::Serialize;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::budget_eval::{evaluate_budget, BudgetVerdict};
use super::outcome::{CycleRecord, RunStatus, WorkflowOutcome};
use super::targets::daily_calorie_target;
use crate::api_connection::{ApiConnectionError, TextCompletionService};
use crate::config::WorkflowConfig;
use crate::conversation::{ConversationState, Message, Role, Speaker};
use crate::error::{LookupUnavailableError, WorkflowError};
use crate::grocery::{GroceryList, PricedList, RecipeSet};
use crate::pricing::{price_grocery_list, PriceLookupService};
use crate::profile::UserProfile;
use crate::prompts;
use crate::response_parser::{parse_grocery_list, parse_recipe_set};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Generating,
    Pricing,
    Routing,
    Recipe,
    Done,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Done | WorkflowState::Failed)
    }
}

/// Everything one run owns. Never shared between runs.
struct RunContext<'a> {
    profile: &'a UserProfile,
    calorie_target: u32,
    conversation: ConversationState,
    current_list: Option<GroceryList>,
    /// Pricing of `current_list`; cleared whenever the list is replaced.
    current_priced: Option<PricedList>,
    last_priced: Option<PricedList>,
    recipes: Option<RecipeSet>,
    cycles: u32,
    generation_accepted: bool,
    budget_unreachable: bool,
    history: Vec<CycleRecord>,
    trace: Vec<WorkflowState>,
}

impl<'a> RunContext<'a> {
    fn new(profile: &'a UserProfile) -> Self {
        let opening = Message::new(Role::User, Speaker::Requester, prompts::opening_request(profile));
        Self {
            profile,
            calorie_target: daily_calorie_target(profile),
            conversation: ConversationState::new(opening),
            current_list: None,
            current_priced: None,
            last_priced: None,
            recipes: None,
            cycles: 0,
            generation_accepted: false,
            budget_unreachable: false,
            history: Vec::new(),
            trace: Vec::new(),
        }
    }

    fn into_outcome(self, final_state: WorkflowState, status: RunStatus, error: Option<WorkflowError>) -> WorkflowOutcome {
        WorkflowOutcome {
            status,
            final_state,
            cycles: self.cycles,
            trace: self.trace,
            grocery_list: self.current_list,
            priced_list: self.last_priced,
            recipes: self.recipes,
            conversation: self.conversation,
            history: self.history,
            error,
        }
    }
}

/// The budget-convergence loop: generate a list, price it, route on the
/// verdict, and feed corrections back until it fits or the cap is hit.
pub struct BudgetWorkflow<C, L> {
    completion: C,
    lookup: L,
    config: WorkflowConfig,
}

impl<C, L> BudgetWorkflow<C, L>
where
    C: TextCompletionService,
    L: PriceLookupService,
{
    pub fn new(completion: C, lookup: L, mut config: WorkflowConfig) -> Self {
        config.max_iterations = config.max_iterations.max(1);
        Self {
            completion,
            lookup,
            config,
        }
    }

    pub fn completion(&self) -> &C {
        &self.completion
    }

    pub async fn run(&self, profile: &UserProfile, cancel: &CancellationToken) -> WorkflowOutcome {
        let mut run = RunContext::new(profile);

        if let Err(err) = profile.validate() {
            warn!(error = %err, "refusing to start workflow");
            run.trace.push(WorkflowState::Failed);
            return run.into_outcome(WorkflowState::Failed, RunStatus::Failed, Some(err.into()));
        }

        info!(
            budget = profile.budget,
            calorie_target = run.calorie_target,
            max_iterations = self.config.max_iterations,
            "starting grocery workflow"
        );

        let mut state = WorkflowState::Generating;
        let mut error = None;
        let mut cancelled = false;
        run.trace.push(state);

        loop {
            if state.is_terminal() {
                break;
            }
            if cancel.is_cancelled() {
                info!(?state, cycles = run.cycles, "workflow cancelled");
                cancelled = true;
                state = WorkflowState::Done;
                run.trace.push(state);
                break;
            }

            let step = match state {
                WorkflowState::Generating => self.generate(&mut run).await,
                WorkflowState::Pricing => self.price(&mut run).await,
                WorkflowState::Routing => Ok(self.route(&mut run)),
                WorkflowState::Recipe => self.write_recipes(&mut run).await,
                WorkflowState::Done | WorkflowState::Failed => break,
            };

            state = match step {
                Ok(next) => next,
                Err(err) => {
                    warn!(?state, error = %err, "workflow failed");
                    error = Some(err);
                    WorkflowState::Failed
                }
            };
            run.trace.push(state);
        }

        let status = if cancelled {
            RunStatus::Cancelled
        } else if error.is_some() {
            RunStatus::Failed
        } else if run.budget_unreachable {
            RunStatus::BudgetUnreachable
        } else {
            RunStatus::Converged
        };
        info!(?status, cycles = run.cycles, "grocery workflow finished");
        run.into_outcome(state, status, error)
    }

    /// `Ok(None)` means the call timed out, which the caller treats like an
    /// unusable completion rather than a failure.
    async fn complete(&self, instruction: &str, conversation: &[Message]) -> Result<Option<String>, WorkflowError> {
        match timeout(self.config.service_timeout, self.completion.complete(instruction, conversation)).await {
            Ok(Ok(content)) => Ok(Some(content)),
            Ok(Err(ApiConnectionError::EmptyCompletion)) => Ok(Some(String::new())),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => {
                warn!(timeout = ?self.config.service_timeout, "text completion timed out");
                Ok(None)
            }
        }
    }

    async fn generate(&self, run: &mut RunContext<'_>) -> Result<WorkflowState, WorkflowError> {
        run.cycles += 1;
        run.generation_accepted = false;
        info!(cycle = run.cycles, "generating grocery list");

        let instruction = prompts::grocery_list_instruction(run.profile, run.calorie_target);
        let Some(content) = self.complete(&instruction, run.conversation.messages()).await? else {
            return Ok(WorkflowState::Pricing);
        };

        match parse_grocery_list(&content, run.profile.budget) {
            Ok(list) => {
                info!(cycle = run.cycles, items = list.len(), "grocery list accepted");
                run.conversation
                    .push(Message::new(Role::Assistant, Speaker::GroceryListGenerator, content));
                run.current_list = Some(list);
                run.current_priced = None;
                run.generation_accepted = true;
            }
            Err(err) => {
                warn!(cycle = run.cycles, error = %err, "malformed grocery list, keeping the previous one");
            }
        }
        Ok(WorkflowState::Pricing)
    }

    async fn price(&self, run: &mut RunContext<'_>) -> Result<WorkflowState, WorkflowError> {
        let Some(list) = run.current_list.as_ref() else {
            debug!(cycle = run.cycles, "no grocery list to price yet");
            return Ok(WorkflowState::Routing);
        };

        let names = list.item_names();
        let quotes = match timeout(self.config.service_timeout, self.lookup.lookup(&names)).await {
            Ok(result) => result?,
            Err(_) => return Err(LookupUnavailableError::Timeout(self.config.service_timeout).into()),
        };

        let priced = price_grocery_list(list, &quotes, self.config.line_total_policy);
        info!(
            cycle = run.cycles,
            total = priced.total_price(),
            missing = priced.missing_items().len(),
            "grocery list priced"
        );
        run.current_priced = Some(priced.clone());
        run.last_priced = Some(priced);
        Ok(WorkflowState::Routing)
    }

    fn route(&self, run: &mut RunContext<'_>) -> WorkflowState {
        let cap_reached = run.cycles >= self.config.max_iterations;
        let verdict = run
            .current_priced
            .as_ref()
            .map(|priced| evaluate_budget(priced, run.profile.budget, self.config.tolerance));

        run.history.push(CycleRecord {
            cycle: run.cycles,
            generation_accepted: run.generation_accepted,
            verdict: verdict.clone(),
        });

        match verdict {
            None if cap_reached => {
                warn!(cycles = run.cycles, "iteration cap reached without a usable grocery list");
                run.budget_unreachable = true;
                WorkflowState::Done
            }
            None => WorkflowState::Generating,
            Some(BudgetVerdict::Converged { total_price, threshold }) => {
                info!(total_price, threshold, "grocery list fits the budget");
                if self.config.recipes_enabled {
                    WorkflowState::Recipe
                } else {
                    WorkflowState::Done
                }
            }
            Some(BudgetVerdict::OverBudget { total_price, threshold, .. }) if cap_reached => {
                warn!(total_price, threshold, cycles = run.cycles, "iteration cap reached while over budget");
                run.budget_unreachable = true;
                WorkflowState::Done
            }
            Some(BudgetVerdict::OverBudget {
                total_price,
                threshold,
                target,
            }) => {
                info!(total_price, threshold, target = %target.name, "over budget, asking for a substitution");
                let feedback = prompts::over_budget_feedback(total_price, threshold, &target);
                run.conversation
                    .push(Message::new(Role::User, Speaker::BudgetRouter, feedback));
                WorkflowState::Generating
            }
        }
    }

    async fn write_recipes(&self, run: &mut RunContext<'_>) -> Result<WorkflowState, WorkflowError> {
        let Some(priced) = run.current_priced.clone() else {
            return Ok(WorkflowState::Done);
        };

        let instruction = prompts::recipe_instruction(run.profile, run.calorie_target);
        let request = Message::new(Role::User, Speaker::RecipeGenerator, prompts::recipe_request(&priced));
        let reply = self.complete(&instruction, std::slice::from_ref(&request)).await?;
        run.conversation.push(request);

        let recipes = match reply {
            Some(content) => {
                let parsed = parse_recipe_set(&content, &priced);
                run.conversation
                    .push(Message::new(Role::Assistant, Speaker::RecipeGenerator, content));
                parsed.unwrap_or_else(|err| {
                    warn!(error = %err, "malformed recipes, keeping an empty set");
                    RecipeSet::empty()
                })
            }
            None => RecipeSet::empty(),
        };
        info!(recipes = recipes.recipes.len(), "recipe stage finished");
        run.recipes = Some(recipes);
        Ok(WorkflowState::Done)
    }
}
