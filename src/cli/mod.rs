use std::fs::File;
use std::io::{stdin, Read};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};

use crate::application::{AppError, LedgerService, Scope};
use crate::config::{LedgerConfig, DEFAULT_WORKERS};
use crate::domain::{format_cents, parse_cents, validate_batch, ImportSummary};
use crate::io::{
    parse_date, parse_day, read_budgets_json, read_transactions_csv, read_transactions_json,
};

/// Spendguard - budget-enforcing transaction ledger
#[derive(Parser)]
#[command(name = "spendguard")]
#[command(about = "Track transactions against per-category budgets")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "spendguard.db", env = "SPENDGUARD_DB")]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Commands,
}

/// Service settings, each overridable from the environment.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// Import workers used when a command does not ask for a specific count
    #[arg(long, global = true, env = "SPENDGUARD_WORKERS", default_value_t = DEFAULT_WORKERS)]
    pub default_workers: usize,

    /// Abort bulk imports running longer than this many seconds
    #[arg(long, global = true, env = "SPENDGUARD_IMPORT_TIMEOUT_SECS")]
    pub import_timeout_secs: Option<u64>,

    /// Abort reports running longer than this many seconds
    #[arg(long, global = true, env = "SPENDGUARD_REPORT_TIMEOUT_SECS")]
    pub report_timeout_secs: Option<u64>,

    /// Interval between report progress log lines, in milliseconds
    #[arg(long, global = true, env = "SPENDGUARD_PROGRESS_INTERVAL_MS", default_value_t = 400)]
    pub progress_interval_ms: u64,

    /// Disable the read cache
    #[arg(long, global = true, env = "SPENDGUARD_NO_CACHE")]
    pub no_cache: bool,

    /// Cache entry lifetime in seconds
    #[arg(long, global = true, env = "SPENDGUARD_CACHE_TTL_SECS", default_value_t = 30)]
    pub cache_ttl_secs: u64,

    /// Serialize writes per category so concurrent writers cannot overshoot a budget
    #[arg(long, global = true, env = "SPENDGUARD_SERIALIZE_WRITES")]
    pub serialize_writes: bool,
}

impl Settings {
    pub fn to_config(&self) -> LedgerConfig {
        LedgerConfig {
            default_workers: self.default_workers,
            import_timeout: self.import_timeout_secs.map(Duration::from_secs),
            report_timeout: self.report_timeout_secs.map(Duration::from_secs),
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            cache_enabled: !self.no_cache,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            serialize_category_writes: self.serialize_writes,
            ..LedgerConfig::default()
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Record a transaction (rejected if it would exceed the category budget)
    Add {
        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Category (case and surrounding whitespace are ignored)
        #[arg(short, long)]
        category: String,

        /// Description of the transaction
        #[arg(short, long, default_value = "")]
        description: String,

        /// Date (YYYY-MM-DD or RFC 3339, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },

    /// List transactions, newest first
    List {
        /// Maximum number of transactions to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Budget management commands
    #[command(subcommand)]
    Budget(BudgetCommands),

    /// Import many transactions concurrently from CSV or JSON
    Import {
        /// Input file (stdin if omitted)
        input: Option<String>,

        /// Format: csv, json (inferred from the file extension, default csv)
        #[arg(short, long)]
        format: Option<String>,

        /// Concurrent workers (0 uses the configured default, capped at 64)
        #[arg(short, long, default_value_t = 0)]
        workers: i32,

        /// Only check the input, without touching the database
        #[arg(long)]
        validate: bool,
    },

    /// Total spending per category over a date range
    Report {
        /// Start date, inclusive (YYYY-MM-DD, defaults to the first of this month)
        #[arg(long)]
        from: Option<String>,

        /// End date, inclusive (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        to: Option<String>,

        /// Output format: table, json
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Include progress against every budget
        #[arg(long)]
        budgets: bool,
    },
}

#[derive(Subcommand)]
pub enum BudgetCommands {
    /// Create or replace the budget for a category
    Set {
        /// Category to limit
        category: String,

        /// Spending limit (e.g., "1000" or "1000.00")
        limit: String,

        /// Period label (defaults to "fixed")
        #[arg(short, long)]
        period: Option<String>,
    },

    /// List all budgets
    List,

    /// Show the budget and current spend of a category
    Show {
        /// Category
        category: String,
    },

    /// Load budgets from a JSON file
    Load {
        /// JSON file with an array of {category, limit, period}
        file: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = self.settings.to_config();
        let service = LedgerService::init(&self.database, config)
            .await
            .map_err(caller_facing)?;

        match self.command {
            Commands::Init => {
                println!("Database initialized: {}", self.database);
            }

            Commands::Add {
                amount,
                category,
                description,
                date,
            } => {
                let amount_cents =
                    parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
                let date = match date {
                    Some(date_str) => parse_date(&date_str)?,
                    None => Utc::now(),
                };

                let transaction = service
                    .add_transaction(amount_cents, &category, &description, date)
                    .await
                    .map_err(caller_facing)?;

                println!(
                    "Recorded transaction #{}: {} {} on {}",
                    transaction.id,
                    format_cents(transaction.amount_cents),
                    transaction.category,
                    transaction.date.format("%Y-%m-%d")
                );
            }

            Commands::List { limit } => {
                run_list_command(&service, limit).await?;
            }

            Commands::Budget(budget_cmd) => {
                run_budget_command(&service, budget_cmd).await?;
            }

            Commands::Import {
                input,
                format,
                workers,
                validate,
            } => {
                run_import_command(&service, input.as_deref(), format.as_deref(), workers, validate)
                    .await?;
            }

            Commands::Report {
                from,
                to,
                format,
                budgets,
            } => {
                run_report_command(&service, from, to, &format, budgets).await?;
            }
        }

        Ok(())
    }
}

/// Map a service failure to the message a user is allowed to see.
fn caller_facing(err: AppError) -> anyhow::Error {
    let caller = LedgerService::caller_error(&err);
    anyhow::anyhow!("{} [{}]", caller.message, caller.kind)
}

/// Scope cancelled by Ctrl-C.
fn interruptible_scope() -> Scope {
    let scope = Scope::new();
    let on_signal = scope.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            on_signal.cancel();
        }
    });
    scope
}

async fn run_list_command(service: &LedgerService, limit: Option<usize>) -> Result<()> {
    let transactions = service.list_transactions().await.map_err(caller_facing)?;
    if transactions.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!(
        "{:>6} {:<10} {:<20} {:>12} {:<30}",
        "ID", "DATE", "CATEGORY", "AMOUNT", "DESCRIPTION"
    );
    println!("{}", "-".repeat(82));
    for tx in transactions.iter().take(limit.unwrap_or(usize::MAX)) {
        println!(
            "{:>6} {:<10} {:<20} {:>12} {:<30}",
            tx.id,
            tx.date.format("%Y-%m-%d"),
            truncate(&tx.category, 20),
            format_cents(tx.amount_cents),
            truncate(&tx.description, 30)
        );
    }
    Ok(())
}

async fn run_budget_command(service: &LedgerService, cmd: BudgetCommands) -> Result<()> {
    match cmd {
        BudgetCommands::Set {
            category,
            limit,
            period,
        } => {
            let limit_cents =
                parse_cents(&limit).context("Invalid limit format. Use '1000.00' or '1000'")?;
            let budget = service
                .set_budget(&category, limit_cents, period.as_deref())
                .await
                .map_err(caller_facing)?;
            println!(
                "Budget set: {} limit {} ({})",
                budget.category,
                format_cents(budget.limit_cents),
                budget.period
            );
        }

        BudgetCommands::List => {
            let budgets = service.list_budgets().await.map_err(caller_facing)?;
            if budgets.is_empty() {
                println!("No budgets found.");
            } else {
                println!("{:<20} {:>12} {:<10}", "CATEGORY", "LIMIT", "PERIOD");
                println!("{}", "-".repeat(44));
                for budget in budgets {
                    println!(
                        "{:<20} {:>12} {:<10}",
                        truncate(&budget.category, 20),
                        format_cents(budget.limit_cents),
                        budget.period
                    );
                }
            }
        }

        BudgetCommands::Show { category } => {
            let budget = service.get_budget(&category).await.map_err(caller_facing)?;
            let spent = service
                .category_spend(&budget.category)
                .await
                .map_err(caller_facing)?;

            println!("Category:  {}", budget.category);
            println!("Limit:     {}", format_cents(budget.limit_cents));
            println!("Period:    {}", budget.period);
            println!("Spent:     {}", format_cents(spent));
            println!("Remaining: {}", format_cents(budget.limit_cents - spent));
        }

        BudgetCommands::Load { file } => {
            let reader =
                File::open(&file).with_context(|| format!("Failed to open budgets file: {}", file))?;
            let inputs = read_budgets_json(reader)?;
            let loaded = service.load_budgets(inputs).await.map_err(caller_facing)?;
            println!("Loaded {} budgets from {}", loaded.len(), file);
        }
    }

    Ok(())
}

async fn run_import_command(
    service: &LedgerService,
    input: Option<&str>,
    format: Option<&str>,
    workers: i32,
    validate: bool,
) -> Result<()> {
    let reader: Box<dyn Read> = match input {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("Failed to open input file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdin()),
    };

    let format = format
        .map(str::to_lowercase)
        .or_else(|| {
            input
                .and_then(|p| Path::new(p).extension())
                .map(|ext| ext.to_string_lossy().to_lowercase())
        })
        .unwrap_or_else(|| "csv".to_string());

    let items = match format.as_str() {
        "csv" => read_transactions_csv(reader)?,
        "json" => read_transactions_json(reader)?,
        _ => anyhow::bail!("Invalid import format '{}'. Valid formats: csv, json", format),
    };

    if validate {
        let rejections = validate_batch(&items);
        println!("Validation complete");
        println!("  Items:   {}", items.len());
        println!("  Invalid: {}", rejections.len());
        for rejection in rejections.iter().take(10) {
            println!("  Item {}: {}", rejection.index, rejection.error);
        }
        if rejections.len() > 10 {
            println!("  ... and {} more errors", rejections.len() - 10);
        }
        return Ok(());
    }

    let total = items.len();
    let scope = interruptible_scope();
    match service.bulk_import(&scope, items, workers).await {
        Ok(summary) => {
            println!("Import complete");
            print_import_summary(&summary);
            Ok(())
        }
        Err(err) => {
            if let Some(partial) = err.partial_import() {
                println!("Import incomplete ({} of {} items processed)", partial.processed(), total);
                print_import_summary(partial);
            }
            Err(caller_facing(err))
        }
    }
}

fn print_import_summary(summary: &ImportSummary) {
    println!("  Accepted: {}", summary.accepted);
    println!("  Rejected: {}", summary.rejected);

    let errors = summary.errors_by_index();
    if !errors.is_empty() {
        println!("\nErrors:");
        for error in errors.iter().take(10) {
            println!("  Item {}: {}", error.index, error.error);
        }
        if errors.len() > 10 {
            println!("  ... and {} more errors", errors.len() - 10);
        }
    }
}

async fn run_report_command(
    service: &LedgerService,
    from: Option<String>,
    to: Option<String>,
    format: &str,
    budgets: bool,
) -> Result<()> {
    let (from_date, to_date) = parse_date_range(from, to)?;
    let scope = interruptible_scope();

    let report = service
        .spending_report(&scope, from_date, to_date)
        .await
        .map_err(caller_facing)?;

    match format {
        "json" => {
            if budgets {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&report.by_category)?);
            }
        }
        _ => {
            println!("Spending Report");
            println!("Period: {} to {}", from_date, to_date);
            println!();
            println!("{:<20} {:>12}", "CATEGORY", "TOTAL");
            println!("{}", "-".repeat(33));
            for (category, total) in &report.by_category {
                println!("{:<20} {:>12}", truncate(category, 20), format_cents(*total));
            }
            println!("{}", "-".repeat(33));
            println!("{:<20} {:>12}", "TOTAL", format_cents(report.total));

            if budgets && !report.progress.is_empty() {
                println!();
                println!(
                    "{:<20} {:>12} {:>12} {:>12} {:>8}",
                    "BUDGET", "LIMIT", "SPENT", "REMAINING", "USED"
                );
                println!("{}", "-".repeat(68));
                for progress in &report.progress {
                    println!(
                        "{:<20} {:>12} {:>12} {:>12} {:>7.1}%",
                        truncate(&progress.category, 20),
                        format_cents(progress.limit_cents),
                        format_cents(progress.spent_cents),
                        format_cents(progress.remaining_cents()),
                        progress.percent
                    );
                }
            }
        }
    }
    Ok(())
}

fn parse_date_range(from: Option<String>, to: Option<String>) -> Result<(NaiveDate, NaiveDate)> {
    let today = Utc::now().date_naive();

    let to_date = match to {
        Some(date_str) => parse_day(&date_str)?,
        None => today,
    };
    let from_date = match from {
        Some(date_str) => parse_day(&date_str)?,
        None => today.with_day(1).unwrap_or(today),
    };

    Ok((from_date, to_date))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
