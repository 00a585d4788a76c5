use async_trait::async_trait;
use grocery_budget::api_connection::{ApiConnectionError, TextCompletionService};
use grocery_budget::config::WorkflowConfig;
use grocery_budget::conversation::{Message, Role, Speaker};
use grocery_budget::error::{LookupUnavailableError, WorkflowError};
use grocery_budget::optim::{
    BudgetVerdict, BudgetWorkflow, CancellationToken, OverageTolerance, RunStatus, WorkflowState,
};
use grocery_budget::pricing::{PriceCatalog, PriceLookupService, PriceQuote, RawPrice};
use grocery_budget::profile::UserProfile;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

enum Reply {
    Text(String),
    Fail(ApiConnectionError),
    Hang,
}

fn text(content: &str) -> Reply {
    Reply::Text(content.to_string())
}

/// Plays back canned replies in order and records what it was asked.
struct ScriptedCompletion {
    replies: Mutex<VecDeque<Reply>>,
    fallback: String,
    calls: Mutex<Vec<(String, Vec<Message>)>>,
}

impl ScriptedCompletion {
    fn new(replies: Vec<Reply>) -> Self {
        Self::with_fallback(replies, "I cannot help with that.")
    }

    fn with_fallback(replies: Vec<Reply>, fallback: &str) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: fallback.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(String, Vec<Message>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextCompletionService for ScriptedCompletion {
    async fn complete(&self, system_instruction: &str, conversation: &[Message]) -> Result<String, ApiConnectionError> {
        self.calls
            .lock()
            .unwrap()
            .push((system_instruction.to_string(), conversation.to_vec()));
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Reply::Text(content)) => Ok(content),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Catalog that goes down after a number of successful lookups.
struct FlakyLookup {
    catalog: PriceCatalog,
    healthy_calls: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl PriceLookupService for FlakyLookup {
    async fn lookup(&self, item_names: &[String]) -> Result<HashMap<String, PriceQuote>, LookupUnavailableError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.healthy_calls {
            return Err(LookupUnavailableError::Service("store scraper unreachable".to_string()));
        }
        self.catalog.lookup(item_names).await
    }
}

/// Catalog that stops answering after a number of successful lookups.
struct StallingLookup {
    catalog: PriceCatalog,
    healthy_calls: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl PriceLookupService for StallingLookup {
    async fn lookup(&self, item_names: &[String]) -> Result<HashMap<String, PriceQuote>, LookupUnavailableError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.healthy_calls {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.catalog.lookup(item_names).await
    }
}

fn profile(budget: f64) -> UserProfile {
    serde_json::from_value(json!({
        "age": 34,
        "sex": "female",
        "height_cm": 168,
        "weight_kg": 62,
        "diet_preferences": ["Omnivore"],
        "allergies": ["Shellfish"],
        "activity_level": "Lightly Active",
        "goal": "Weight Loss",
        "medical_conditions": [],
        "budget": budget
    }))
    .unwrap()
}

fn catalog(prices: &[(&str, f64)]) -> PriceCatalog {
    PriceCatalog::from_quotes(prices.iter().map(|(name, price)| {
        (
            *name,
            PriceQuote {
                unit_price: RawPrice::Amount(*price),
                url: format!("https://store.example/{}", name.replace(' ', "-")),
            },
        )
    }))
}

fn list_json(items: &[(&str, &str)]) -> String {
    let items: Vec<_> = items
        .iter()
        .map(|(name, quantity)| json!({"name": name, "quantity": quantity}))
        .collect();
    json!({ "items": items }).to_string()
}

fn no_recipes() -> WorkflowConfig {
    WorkflowConfig {
        recipes_enabled: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn scenario_a_single_cheap_item_converges() {
    let completion = ScriptedCompletion::new(vec![text(&list_json(&[("rice", "2kg")]))]);
    let workflow = BudgetWorkflow::new(completion, catalog(&[("rice", 5.0)]), no_recipes());

    let outcome = workflow.run(&profile(50.0), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::Converged);
    assert_eq!(outcome.final_state, WorkflowState::Done);
    assert_eq!(outcome.cycles, 1);
    let verdict = outcome.history[0].verdict.as_ref().expect("first cycle was priced");
    assert!(verdict.is_converged());
    assert_eq!(verdict.total_price(), 5.0);
    assert!((verdict.threshold() - 55.0).abs() < 1e-9);
    assert_eq!(
        outcome.trace,
        vec![
            WorkflowState::Generating,
            WorkflowState::Pricing,
            WorkflowState::Routing,
            WorkflowState::Done
        ]
    );
    assert!(outcome.recipes.is_none());
}

#[tokio::test]
async fn scenario_a_with_recipes_enabled_writes_recipes() {
    let recipes = json!({"recipes": [{
        "name": "Fried rice",
        "ingredients": [{"name": "rice", "quantity": "200 g"}],
        "instructions": ["Boil the rice.", "Fry it."]
    }]})
    .to_string();
    let completion = ScriptedCompletion::new(vec![text(&list_json(&[("rice", "2kg")])), text(&recipes)]);
    let workflow = BudgetWorkflow::new(completion, catalog(&[("rice", 5.0)]), WorkflowConfig::default());

    let outcome = workflow.run(&profile(50.0), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::Converged);
    assert_eq!(outcome.trace[outcome.trace.len() - 2], WorkflowState::Recipe);
    let recipes = outcome.recipes.expect("recipes attached");
    assert_eq!(recipes.recipes.len(), 1);
    assert_eq!(recipes.recipes[0].name, "Fried rice");
}

#[tokio::test]
async fn scenario_b_over_budget_targets_the_priciest_item() {
    let completion = ScriptedCompletion::new(vec![text(&list_json(&[
        ("salmon fillet", "1 lb"),
        ("chicken thighs", "2 lbs"),
    ]))]);
    let config = WorkflowConfig {
        max_iterations: 1,
        ..no_recipes()
    };
    let workflow = BudgetWorkflow::new(
        completion,
        catalog(&[("salmon fillet", 15.0), ("chicken thighs", 10.0)]),
        config,
    );

    let outcome = workflow.run(&profile(20.0), &CancellationToken::new()).await;

    match &outcome.history[0].verdict {
        Some(BudgetVerdict::OverBudget {
            total_price, target, ..
        }) => {
            assert_eq!(*total_price, 25.0);
            assert_eq!(target.name, "salmon fillet");
            assert_eq!(target.unit_price, 15.0);
        }
        other => panic!("expected an over-budget verdict, got {:?}", other),
    }
    assert_eq!(outcome.status, RunStatus::BudgetUnreachable);
}

#[tokio::test]
async fn over_budget_feedback_reaches_the_next_generation() {
    let completion = ScriptedCompletion::new(vec![
        text(&list_json(&[("salmon fillet", "1 lb"), ("chicken thighs", "2 lbs")])),
        text(&list_json(&[("canned tuna", "3 cans"), ("chicken thighs", "2 lbs")])),
    ]);
    let workflow = BudgetWorkflow::new(
        completion,
        catalog(&[("salmon fillet", 15.0), ("chicken thighs", 10.0), ("canned tuna", 4.5)]),
        no_recipes(),
    );

    let outcome = workflow.run(&profile(20.0), &CancellationToken::new()).await;
    assert_eq!(outcome.status, RunStatus::Converged);
    assert_eq!(outcome.cycles, 2);
    assert_eq!(outcome.priced_list.as_ref().unwrap().total_price(), 14.5);

    let calls = workflow_calls(&workflow);
    assert_eq!(calls.len(), 2);
    let second_request = &calls[1].1;
    let feedback = second_request.last().unwrap();
    assert_eq!(feedback.role, Role::User);
    assert_eq!(feedback.speaker, Speaker::BudgetRouter);
    assert_eq!(
        feedback.content,
        "The total price $25.00 is over budget threshold ($22.00). Please replace salmon fillet ($15.00/unit) with a cheaper alternative."
    );
}

fn workflow_calls(workflow: &BudgetWorkflow<ScriptedCompletion, PriceCatalog>) -> Vec<(String, Vec<Message>)> {
    workflow.completion().calls()
}

#[tokio::test]
async fn scenario_c_leading_prose_wastes_one_iteration() {
    let completion = ScriptedCompletion::new(vec![
        text(&format!("Sure! Here's your list: {}", list_json(&[("rice", "2kg")]))),
        text(&list_json(&[("rice", "2kg")])),
    ]);
    let workflow = BudgetWorkflow::new(completion, catalog(&[("rice", 5.0)]), no_recipes());

    let outcome = workflow.run(&profile(50.0), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::Converged);
    assert_eq!(outcome.cycles, 2);
    assert!(!outcome.history[0].generation_accepted);
    assert!(outcome.history[0].verdict.is_none());
    assert_eq!(
        outcome.conversation.by_speaker(Speaker::GroceryListGenerator).count(),
        1
    );
}

#[tokio::test]
async fn scenario_d_iteration_cap_keeps_the_last_over_budget_list() {
    let completion = ScriptedCompletion::new(vec![
        text(&list_json(&[("steak", "2 lbs"), ("rice", "2kg")])),
        text(&list_json(&[("lobster", "1"), ("rice", "2kg")])),
        text(&list_json(&[("wagyu", "1 lb"), ("rice", "2kg")])),
        text(&list_json(&[("rice", "2kg")])),
    ]);
    let config = WorkflowConfig {
        max_iterations: 3,
        ..WorkflowConfig::default()
    };
    let workflow = BudgetWorkflow::new(
        completion,
        catalog(&[("steak", 30.0), ("lobster", 45.0), ("wagyu", 60.0), ("rice", 5.0)]),
        config,
    );

    let outcome = workflow.run(&profile(20.0), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::BudgetUnreachable);
    assert!(outcome.budget_unreachable());
    assert_eq!(outcome.final_state, WorkflowState::Done);
    assert_eq!(outcome.cycles, 3);
    assert!(outcome.recipes.is_none());

    let priced = outcome.priced_list.expect("best-effort list attached");
    assert!(priced.contains("wagyu"));
    assert_eq!(priced.total_price(), 65.0);
    // Feedback only for the cycles that were followed by another attempt.
    assert_eq!(outcome.conversation.by_speaker(Speaker::BudgetRouter).count(), 2);
    assert_eq!(workflow_calls(&workflow).len(), 3);
}

#[tokio::test]
async fn never_valid_json_terminates_at_the_cap() {
    let completion = ScriptedCompletion::with_fallback(vec![], "no idea, sorry");
    let config = WorkflowConfig {
        max_iterations: 4,
        ..WorkflowConfig::default()
    };
    let workflow = BudgetWorkflow::new(completion, catalog(&[("rice", 5.0)]), config);

    let outcome = workflow.run(&profile(30.0), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::BudgetUnreachable);
    assert_eq!(outcome.cycles, 4);
    assert!(outcome.grocery_list.is_none());
    assert!(outcome.priced_list.is_none());
    assert!(outcome.history.iter().all(|cycle| cycle.verdict.is_none()));
}

#[tokio::test]
async fn malformed_reply_reprices_the_previous_list() {
    let completion = ScriptedCompletion::new(vec![
        text(&list_json(&[("steak", "2 lbs")])),
        text("{\"items\": \"not a list\"}"),
        text(&list_json(&[("beans", "1 kg")])),
    ]);
    let workflow = BudgetWorkflow::new(completion, catalog(&[("steak", 30.0), ("beans", 2.0)]), no_recipes());

    let outcome = workflow.run(&profile(20.0), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::Converged);
    assert_eq!(outcome.cycles, 3);
    assert!(!outcome.history[1].generation_accepted);
    assert_eq!(outcome.history[1].verdict.as_ref().map(|v| v.total_price()), Some(30.0));
    assert!(outcome.priced_list.unwrap().contains("beans"));
}

#[tokio::test]
async fn lookup_failure_fails_with_the_last_priced_list() {
    let completion = ScriptedCompletion::new(vec![
        text(&list_json(&[("steak", "2 lbs")])),
        text(&list_json(&[("chicken", "2 lbs")])),
    ]);
    let lookup = FlakyLookup {
        catalog: catalog(&[("steak", 30.0), ("chicken", 8.0)]),
        healthy_calls: 1,
        calls: AtomicUsize::new(0),
    };
    let workflow = BudgetWorkflow::new(completion, lookup, no_recipes());

    let outcome = workflow.run(&profile(20.0), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.final_state, WorkflowState::Failed);
    assert!(matches!(
        outcome.error,
        Some(WorkflowError::LookupUnavailable(LookupUnavailableError::Service(_)))
    ));
    let priced = outcome.priced_list.expect("last priced list kept");
    assert!(priced.contains("steak"));
    assert!(!priced.contains("chicken"));
    assert!(outcome.grocery_list.unwrap().items.iter().any(|i| i.name == "chicken"));
}

#[tokio::test]
async fn lookup_timeout_fails_with_the_last_priced_list() {
    let completion = ScriptedCompletion::new(vec![
        text(&list_json(&[("steak", "2 lbs")])),
        text(&list_json(&[("chicken", "2 lbs")])),
    ]);
    let lookup = StallingLookup {
        catalog: catalog(&[("steak", 30.0), ("chicken", 8.0)]),
        healthy_calls: 1,
        calls: AtomicUsize::new(0),
    };
    let config = WorkflowConfig {
        service_timeout: Duration::from_millis(50),
        ..no_recipes()
    };
    let workflow = BudgetWorkflow::new(completion, lookup, config);

    let outcome = workflow.run(&profile(20.0), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert_eq!(outcome.final_state, WorkflowState::Failed);
    assert_eq!(outcome.cycles, 2);
    assert!(matches!(
        outcome.error,
        Some(WorkflowError::LookupUnavailable(LookupUnavailableError::Timeout(_)))
    ));
    let priced = outcome.priced_list.expect("last priced list kept");
    assert!(priced.contains("steak"));
    assert_eq!(priced.total_price(), 30.0);
}

#[tokio::test]
async fn empty_lists_never_converge() {
    let completion = ScriptedCompletion::with_fallback(vec![], "{\"items\": []}");
    let config = WorkflowConfig {
        max_iterations: 3,
        ..WorkflowConfig::default()
    };
    let workflow = BudgetWorkflow::new(completion, catalog(&[("rice", 5.0)]), config);

    let outcome = workflow.run(&profile(50.0), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::BudgetUnreachable);
    assert_eq!(outcome.cycles, 3);
    assert!(outcome.grocery_list.is_none());
    assert!(outcome.priced_list.is_none());
    assert!(outcome.recipes.is_none());
    assert!(outcome.history.iter().all(|cycle| !cycle.generation_accepted));
}

#[tokio::test]
async fn empty_list_costs_one_iteration() {
    let completion = ScriptedCompletion::new(vec![text("{\"items\": []}"), text(&list_json(&[("rice", "2kg")]))]);
    let workflow = BudgetWorkflow::new(completion, catalog(&[("rice", 5.0)]), no_recipes());

    let outcome = workflow.run(&profile(50.0), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::Converged);
    assert_eq!(outcome.cycles, 2);
    assert_eq!(outcome.grocery_list.unwrap().len(), 1);
}

#[tokio::test]
async fn completion_service_error_fails_the_run() {
    let completion = ScriptedCompletion::new(vec![Reply::Fail(ApiConnectionError::MissingApiKey(
        "OPENROUTER_API_KEY".to_string(),
    ))]);
    let workflow = BudgetWorkflow::new(completion, catalog(&[("rice", 5.0)]), no_recipes());

    let outcome = workflow.run(&profile(50.0), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(matches!(outcome.error, Some(WorkflowError::Completion(_))));
    assert_eq!(outcome.trace, vec![WorkflowState::Generating, WorkflowState::Failed]);
}

#[tokio::test]
async fn empty_completion_is_recoverable() {
    let completion = ScriptedCompletion::new(vec![
        Reply::Fail(ApiConnectionError::EmptyCompletion),
        text(&list_json(&[("rice", "2kg")])),
    ]);
    let workflow = BudgetWorkflow::new(completion, catalog(&[("rice", 5.0)]), no_recipes());

    let outcome = workflow.run(&profile(50.0), &CancellationToken::new()).await;
    assert_eq!(outcome.status, RunStatus::Converged);
    assert_eq!(outcome.cycles, 2);
}

#[tokio::test]
async fn generation_timeout_wastes_one_iteration() {
    let completion = ScriptedCompletion::new(vec![Reply::Hang, text(&list_json(&[("rice", "2kg")]))]);
    let config = WorkflowConfig {
        service_timeout: Duration::from_millis(50),
        ..no_recipes()
    };
    let workflow = BudgetWorkflow::new(completion, catalog(&[("rice", 5.0)]), config);

    let outcome = workflow.run(&profile(50.0), &CancellationToken::new()).await;
    assert_eq!(outcome.status, RunStatus::Converged);
    assert_eq!(outcome.cycles, 2);
}

#[tokio::test]
async fn unparsable_recipes_leave_an_empty_set() {
    let completion = ScriptedCompletion::new(vec![
        text(&list_json(&[("rice", "2kg")])),
        text("Here are some recipes you might enjoy!"),
    ]);
    let workflow = BudgetWorkflow::new(completion, catalog(&[("rice", 5.0)]), WorkflowConfig::default());

    let outcome = workflow.run(&profile(50.0), &CancellationToken::new()).await;

    assert_eq!(outcome.status, RunStatus::Converged);
    assert_eq!(outcome.final_state, WorkflowState::Done);
    assert!(outcome.recipes.expect("recipe stage ran").is_empty());
    assert_eq!(outcome.conversation.by_speaker(Speaker::RecipeGenerator).count(), 2);
}

#[tokio::test]
async fn recipe_stage_only_sees_the_priced_list() {
    let completion = ScriptedCompletion::new(vec![
        text(&list_json(&[("rice", "2kg"), ("black beans", "1 kg")])),
        text("{\"recipes\": []}"),
    ]);
    let workflow = BudgetWorkflow::new(
        completion,
        catalog(&[("rice", 5.0), ("black beans", 2.0)]),
        WorkflowConfig::default(),
    );

    workflow.run(&profile(50.0), &CancellationToken::new()).await;

    let calls = workflow_calls(&workflow);
    let (instruction, conversation) = calls.last().unwrap();
    assert!(instruction.contains("meal planner"));
    assert_eq!(conversation.len(), 1);
    assert!(conversation[0].content.contains("- black beans (1 kg)"));
}

#[tokio::test]
async fn cancellation_stops_the_loop() {
    let cancel = CancellationToken::new();
    let cancel_after_first = cancel.clone();

    struct CancellingLookup {
        inner: PriceCatalog,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl PriceLookupService for CancellingLookup {
        async fn lookup(&self, item_names: &[String]) -> Result<HashMap<String, PriceQuote>, LookupUnavailableError> {
            self.cancel.cancel();
            self.inner.lookup(item_names).await
        }
    }

    let completion = ScriptedCompletion::new(vec![text(&list_json(&[("steak", "2 lbs")]))]);
    let lookup = CancellingLookup {
        inner: catalog(&[("steak", 30.0)]),
        cancel: cancel_after_first,
    };
    let workflow = BudgetWorkflow::new(completion, lookup, no_recipes());

    let outcome = workflow.run(&profile(20.0), &cancel).await;

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(outcome.final_state, WorkflowState::Done);
    assert_eq!(outcome.cycles, 1);
    assert!(outcome.priced_list.is_some());
    assert_eq!(
        outcome.trace,
        vec![
            WorkflowState::Generating,
            WorkflowState::Pricing,
            WorkflowState::Routing,
            WorkflowState::Done
        ]
    );
}

#[tokio::test]
async fn conversation_only_grows() {
    let completion = ScriptedCompletion::new(vec![
        text(&list_json(&[("steak", "2 lbs")])),
        text("garbage"),
        text(&list_json(&[("beans", "1 kg")])),
        text("{\"recipes\": []}"),
    ]);
    let workflow = BudgetWorkflow::new(
        completion,
        catalog(&[("steak", 30.0), ("beans", 2.0)]),
        WorkflowConfig::default(),
    );

    let outcome = workflow.run(&profile(20.0), &CancellationToken::new()).await;
    let calls = workflow_calls(&workflow);

    // Each generation request extends the one before it.
    for pair in calls[..3].windows(2) {
        let (earlier, later) = (&pair[0].1, &pair[1].1);
        assert!(later.len() >= earlier.len());
        assert_eq!(&later[..earlier.len()], earlier.as_slice());
    }
    let log = outcome.conversation.messages();
    assert_eq!(log[0].speaker, Speaker::Requester);
    assert_eq!(&log[..calls[2].1.len()], calls[2].1.as_slice());
    assert_eq!(outcome.conversation.version(), log.len());
}

#[tokio::test]
async fn concurrent_runs_do_not_share_state() {
    let completion = ScriptedCompletion::with_fallback(vec![], &list_json(&[("rice", "2kg"), ("tofu", "1 block")]));
    let workflow = BudgetWorkflow::new(
        completion,
        catalog(&[("rice", 5.0), ("tofu", 3.0)]),
        WorkflowConfig {
            tolerance: OverageTolerance::Flat(5.0),
            ..no_recipes()
        },
    );
    let cancel = CancellationToken::new();
    let cheap = profile(1.0);
    let generous = profile(80.0);

    let (tight, loose) = tokio::join!(workflow.run(&cheap, &cancel), workflow.run(&generous, &cancel));

    assert_eq!(loose.status, RunStatus::Converged);
    assert_eq!(loose.cycles, 1);
    assert_eq!(tight.status, RunStatus::BudgetUnreachable);
    assert_eq!(tight.cycles, 5);
    assert_eq!(tight.priced_list.unwrap().budget(), 1.0);
    assert_eq!(loose.priced_list.unwrap().budget(), 80.0);
    assert!(loose.conversation.messages()[0].content.contains("$80.00"));
    assert!(tight.conversation.messages()[0].content.contains("$1.00"));
    assert_eq!(loose.conversation.by_speaker(Speaker::BudgetRouter).count(), 0);
}
