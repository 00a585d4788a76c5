use anyhow::{bail, Context, Result};
use grocery_budget::api_connection::OpenRouterCompletion;
use grocery_budget::cli::parse_args;
use grocery_budget::config::{ProviderConfig, WorkflowConfig};
use grocery_budget::optim::{BudgetWorkflow, CancellationToken, RunStatus, WorkflowOutcome};
use grocery_budget::pricing::PriceCatalog;
use grocery_budget::profile::UserProfile;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn print_summary(outcome: &WorkflowOutcome) {
    println!("\nWorkflow finished after {} cycle(s): {:?}", outcome.cycles, outcome.status);

    if let Some(priced) = &outcome.priced_list {
        println!("\nGrocery list (budget ${:.2}):", priced.budget());
        for item in priced.items() {
            match item.unit_price {
                Some(price) => println!("  - {} ({}): ${:.2}", item.name, item.quantity, price),
                None => println!("  - {} ({}): no price found", item.name, item.quantity),
            }
        }
        println!("Total: ${:.2}", priced.total_price());
        if !priced.missing_items().is_empty() {
            println!("Unpriced: {}", priced.missing_items().join(", "));
        }
    }

    if let Some(recipes) = &outcome.recipes {
        println!("\nRecipes:");
        if recipes.is_empty() {
            println!("  (none)");
        }
        for recipe in &recipes.recipes {
            println!("  - {} ({} ingredients)", recipe.name, recipe.ingredients.len());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli_args = parse_args();

    let mut profile = UserProfile::load(&cli_args.profile).await?;
    if let Some(budget) = cli_args.budget {
        profile.budget = budget;
    }
    profile.validate().context("Profile rejected")?;

    let mut config = WorkflowConfig::from_env()?;
    cli_args.apply_to(&mut config);
    config.validate()?;

    let mut provider_config = ProviderConfig::from_env()?;
    cli_args.apply_to_provider(&mut provider_config);
    info!(model = %provider_config.model, "using completion model");

    let catalog = PriceCatalog::load(&cli_args.catalog).await?;
    let workflow = BudgetWorkflow::new(OpenRouterCompletion::new(provider_config), catalog, config);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current step");
            interrupt.cancel();
        }
    });

    let outcome = workflow.run(&profile, &cancel).await;
    print_summary(&outcome);

    let written = outcome.write_artifacts(&cli_args.output_dir).await?;
    for path in &written {
        println!("Wrote {}", path.display());
    }

    match outcome.status {
        RunStatus::Converged => Ok(()),
        RunStatus::BudgetUnreachable => {
            println!("\nNo list fit the budget; the last attempt was kept.");
            Ok(())
        }
        RunStatus::Cancelled => bail!("Workflow cancelled"),
        RunStatus::Failed => match outcome.error {
            Some(err) => Err(err).context("Workflow failed"),
            None => bail!("Workflow failed"),
        },
    }
}
