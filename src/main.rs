//! jup - Juju upgrade plan orchestrator CLI tool.
//!
//! Executes a declarative YAML upgrade plan:
//! - Optional juju-core upgrade
//! - Ordered steps of charm upgrades from the charm store
//! - Pre/post upgrade hooks on the control host or on remote units
//! - Per-item abort/continue failure policy

mod config;
mod error;
mod juju;
mod output;
mod plan;
mod upgrade;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use dialoguer::Confirm;
use tracing::{Span, debug, error, info, info_span};

use config::{Args, Config};
use error::JupError;
use juju::commands::CommandBuilder;
use juju::runner::{CommandRunner, DryRunRunner, JujuCli};
use plan::UpgradePlan;
use upgrade::executor::{ExecutionSummary, PlanExecutor};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    let config = Config::from_args(args);

    // Initialize logging
    if let Err(e) = init_tracing(&config.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    debug!("Starting jup - Juju Upgrade Plan");

    if let Err(e) = run(&config).await {
        match e.downcast_ref::<JupError>() {
            Some(fatal) if fatal.is_fatal() => error!("Upgrade plan aborted: {}", fatal),
            _ => error!("{:#}", e),
        }
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(config: &Config) -> Result<()> {
    let plan = UpgradePlan::load(&config.plan_path)?;
    let source = config.plan_path.display().to_string();

    output::print_upgrade_plan(&plan, &source);

    if config.needs_confirmation() {
        println!(
            "{}",
            "This will upgrade your Juju environment. This action cannot be undone."
                .yellow()
                .bold()
        );
        if !Confirm::new()
            .with_prompt("Proceed with upgrade?")
            .default(false)
            .interact()?
        {
            return Err(JupError::UserCancelled.into());
        }
    }

    let commands = CommandBuilder::new(config.environment.clone());
    let span = info_span!("plan", file = %source);
    info!(
        parent: &span,
        "Executing upgrade plan on environment: {}",
        commands.environment().unwrap_or("(current)")
    );

    let summary = if config.dry_run {
        println!("{}", "[DRY RUN] No commands will be executed.".yellow());
        let runner = DryRunRunner::new(info_span!(parent: &span, "dry_run"));
        execute(&runner, &plan, commands, span).await?
    } else {
        let runner = JujuCli::new(
            &config.juju_bin,
            commands.clone(),
            config.command_timeout,
            info_span!(parent: &span, "runner"),
        );
        execute(&runner, &plan, commands, span).await?
    };

    output::print_execution_summary(&summary);

    Ok(())
}

async fn execute<R: CommandRunner>(
    runner: &R,
    plan: &UpgradePlan,
    commands: CommandBuilder,
    span: Span,
) -> Result<ExecutionSummary, JupError> {
    PlanExecutor::new(runner, commands, span).execute(plan).await
}

/// Initialize tracing subscriber.
fn init_tracing(log_level: &str) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to initialize log filter: {}", e))?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
