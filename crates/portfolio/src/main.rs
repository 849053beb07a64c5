use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use portfolio::config::Config;
use portfolio::repository::{AnalyticsRepository, PostRepository, VisitorRepository};
use portfolio::storage::DynamoDbStore;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portfolio_core::analytics::{DailyTrend, MonthlyTrend, TopContent};

/// Maintenance tasks for the portfolio content table
#[derive(Parser, Debug)]
#[command(name = "portfolio")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Override the table name from DYNAMODB_TABLE_NAME
    #[arg(long, global = true)]
    table: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recount posts per category and overwrite the category aggregates
    ReconcileCategories,

    /// Print the category aggregates as JSON
    Categories,

    /// Print view and visitor statistics as JSON
    Stats {
        /// Number of entries per content kind in the top list
        #[arg(long, default_value = "5")]
        top: usize,

        /// Days covered by the daily visitor trend
        #[arg(long, default_value = "30")]
        days: u32,

        /// Months covered by the monthly visitor trend
        #[arg(long, default_value = "12")]
        months: u32,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Stats {
    total_views: u64,
    total_visitors: u64,
    top_content: TopContent,
    daily_trends: Vec<DailyTrend>,
    monthly_trends: Vec<MonthlyTrend>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portfolio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::from_env();
    if let Some(table) = cli.table {
        config.table_name = table;
    }

    let store = Arc::new(DynamoDbStore::from_config(&config).await);
    tracing::info!(table = store.table_name(), "Connected to content table");

    match cli.command {
        Command::ReconcileCategories => {
            let posts = PostRepository::new(Arc::clone(&store), &config);
            let categories = posts.reconcile_categories().await?;
            tracing::info!(categories = categories.len(), "Reconciled category counts");
            print_json(&categories)?;
        }
        Command::Categories => {
            let posts = PostRepository::new(Arc::clone(&store), &config);
            print_json(&posts.categories().await?)?;
        }
        Command::Stats { top, days, months } => {
            let analytics = AnalyticsRepository::new(Arc::clone(&store));
            let visitors = VisitorRepository::new(Arc::clone(&store));

            let (total_views, top_content, total_visitors, daily_trends, monthly_trends) =
                tokio::try_join!(
                    analytics.total_views(),
                    analytics.top_content(top),
                    visitors.total_visitors(),
                    visitors.daily_trends(days),
                    visitors.monthly_trends(months),
                )?;

            print_json(&Stats {
                total_views,
                total_visitors,
                top_content,
                daily_trends,
                monthly_trends,
            })?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
