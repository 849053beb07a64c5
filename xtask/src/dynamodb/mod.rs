//! DynamoDB infrastructure management commands.

mod client;
mod config;
mod deploy;
mod error;
mod planning;

pub use error::{DynamodbError, Result};

use crate::prelude::*;
use dialoguer::Confirm;

#[derive(Debug, clap::Parser)]
pub struct DynamodbCommand {
    #[command(subcommand)]
    pub action: DynamodbAction,
}

#[derive(Debug, clap::Subcommand)]
pub enum DynamodbAction {
    /// Deploy or destroy the portfolio table.
    Deploy(DeployCommand),

    /// Show the table's indexes and TTL and what a deploy would change.
    Status(StatusCommand),
}

/// Deploy or update DynamoDB infrastructure.
#[derive(Debug, clap::Parser)]
#[command(long_about = "Deploy or destroy DynamoDB table infrastructure.

By default, this command creates or updates the portfolio DynamoDB table
with PK/SK keys, the GSI1 listing index, and TTL on ExpiresAt.

The command shows a plan of changes before applying and asks for confirmation.

Environment variables:
  DYNAMODB_TABLE_NAME - Table to manage (defaults to portfolio-api-table)
  DYNAMODB_ENDPOINT   - Use local DynamoDB (e.g., http://localhost:8000)
  AWS_ENDPOINT_URL    - Fallback for DYNAMODB_ENDPOINT
  AWS_REGION          - AWS region (defaults to us-east-1)
  AWS_PROFILE         - AWS profile to use for credentials")]
pub struct DeployCommand {
    /// Skip confirmation prompts.
    #[arg(long)]
    pub force: bool,

    /// Destroy the table instead of creating/updating.
    #[arg(long)]
    pub destroy: bool,

    #[arg(long, env = "DYNAMODB_TABLE_NAME", default_value = config::DEFAULT_TABLE_NAME)]
    pub table_name: String,
}

#[derive(Debug, clap::Parser)]
pub struct StatusCommand {
    #[arg(long, env = "DYNAMODB_TABLE_NAME", default_value = config::DEFAULT_TABLE_NAME)]
    pub table_name: String,
}

pub async fn run(command: DynamodbCommand, global: crate::Global) -> Result<()> {
    match command.action {
        DynamodbAction::Deploy(cmd) if cmd.destroy => run_destroy(cmd, &global).await,
        DynamodbAction::Deploy(cmd) => run_deploy(cmd, &global).await,
        DynamodbAction::Status(cmd) => run_status(cmd).await,
    }
}

async fn connect(global: &crate::Global) -> Result<aws_sdk_dynamodb::Client> {
    let aws_config = client::AwsConfig::default();
    if !global.is_silent() {
        aprintln!("{} {}", p_b("Target:"), aws_config.target_display());
        aprintln!();
    }
    client::create_client(&aws_config).await
}

fn confirm(prompt: &str, default: bool) -> Result<()> {
    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()?;

    if confirmed {
        Ok(())
    } else {
        Err(DynamodbError::UserCancelled)
    }
}

async fn run_destroy(cmd: DeployCommand, global: &crate::Global) -> Result<()> {
    let dynamo_client = connect(global).await?;
    let current_state = client::get_table_state(&dynamo_client, &cmd.table_name).await?;
    let plan = planning::calculate_destroy_plan(current_state.as_ref(), &cmd.table_name);

    if !global.is_silent() {
        aprintln!("{}", p_y("Destroy Plan:"));
        for line in planning::format_destroy_plan(&plan) {
            aprintln!("  {}", p_r(&line));
        }
        aprintln!();
    }

    if matches!(plan, planning::DestroyPlan::AlreadyGone { .. }) {
        if !global.is_silent() {
            aprintln!("{}", p_g("Nothing to destroy."));
        }
        return Ok(());
    }

    if !cmd.force {
        confirm(
            "Are you sure you want to delete this table? ALL DATA WILL BE LOST",
            false,
        )?;
    }

    if !global.is_silent() {
        aprintln!("{}", p_b("Deleting table..."));
    }

    deploy::execute_destroy_plan(&dynamo_client, &plan).await?;

    if !global.is_silent() {
        aprintln!("{}", p_g("Table destroyed successfully."));
    }
    Ok(())
}

async fn run_deploy(cmd: DeployCommand, global: &crate::Global) -> Result<()> {
    let dynamo_client = connect(global).await?;
    let current_state = client::get_table_state(&dynamo_client, &cmd.table_name).await?;
    let table_config = config::portfolio_table_config().with_table_name(&cmd.table_name);
    let plan = planning::calculate_deploy_plan(current_state.as_ref(), &table_config);

    if !global.is_silent() {
        aprintln!("{}", p_c("Deploy Plan:"));
        print_plan(&plan);
        aprintln!();
    }

    if matches!(plan, planning::DeployPlan::NoChanges { .. }) {
        if !global.is_silent() {
            aprintln!("{}", p_g("Infrastructure is up to date."));
        }
        return Ok(());
    }

    if !cmd.force {
        confirm("Apply these changes?", true)?;
    }

    if !global.is_silent() {
        aprintln!("{}", p_b("Applying changes..."));
    }

    deploy::execute_deploy_plan(&dynamo_client, &plan).await?;

    if !global.is_silent() {
        aprintln!("{}", p_g("Infrastructure deployed successfully."));
    }
    Ok(())
}

async fn run_status(cmd: StatusCommand) -> Result<()> {
    let aws_config = client::AwsConfig::default();
    let dynamo_client = client::create_client(&aws_config).await?;
    let Some(state) = client::get_table_state(&dynamo_client, &cmd.table_name).await? else {
        return Err(DynamodbError::TableNotFound {
            table_name: cmd.table_name,
        });
    };

    aprintln!("{} {}", p_b("Target:"), aws_config.target_display());
    aprintln!("{} {} ({:?})", p_b("Table:"), cmd.table_name, state.status);
    for gsi in &state.gsis {
        aprintln!("{} {} ({:?})", p_b("Index:"), gsi.name, gsi.status);
    }
    aprintln!(
        "{} {}",
        p_b("TTL:"),
        state.ttl_attribute.as_deref().unwrap_or("disabled")
    );
    aprintln!();

    let table_config = config::portfolio_table_config().with_table_name(&cmd.table_name);
    print_plan(&planning::calculate_deploy_plan(Some(&state), &table_config));
    Ok(())
}

fn print_plan(plan: &planning::DeployPlan) {
    for line in planning::format_deploy_plan(plan) {
        if line.starts_with('+') {
            aprintln!("  {}", p_g(&line));
        } else if line.starts_with('-') {
            aprintln!("  {}", p_r(&line));
        } else if line.starts_with('~') {
            aprintln!("  {}", p_y(&line));
        } else {
            aprintln!("  {}", line);
        }
    }
}
