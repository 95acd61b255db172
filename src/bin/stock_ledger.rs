use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use stock_ledger::{
    config::{self, AppConfig},
    db,
    entities::Location,
    events::process_events,
    StockLedger,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config().context("failed to load ledger config")?;
    config::init_tracing(config.log_level(), config.log_json);

    match cli.command {
        Commands::Migrate => handle_migrate(&config).await,
        Commands::OnHand(args) => handle_on_hand(&connect(&config).await?, args, cli.json).await,
        Commands::Drift(args) => handle_drift(&connect(&config).await?, args, cli.json).await,
        Commands::Reconcile(args) => {
            handle_reconcile(&connect(&config).await?, args, cli.json).await
        }
        Commands::LowStock => handle_low_stock(&connect(&config).await?, cli.json).await,
    }
}

#[derive(Parser)]
#[command(name = "stock-ledger", about = "Operator tools for the stock ledger", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Show the cached on-hand quantity of an item at one location
    OnHand(OnHandArgs),
    /// List locations whose cached quantity differs from the batch sum
    Drift(ItemFilterArgs),
    /// Back registry surpluses with adjustment batches
    Reconcile(ItemFilterArgs),
    /// List active items at or below their reorder level
    LowStock,
}

#[derive(Args)]
struct OnHandArgs {
    #[arg(long)]
    item: i64,
    #[arg(long, value_enum)]
    location: LocationArg,
}

#[derive(Args)]
struct ItemFilterArgs {
    /// Restrict to one item; all active items otherwise
    #[arg(long)]
    item: Option<i64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LocationArg {
    Shop,
    Store,
}

impl From<LocationArg> for Location {
    fn from(arg: LocationArg) -> Self {
        match arg {
            LocationArg::Shop => Location::Shop,
            LocationArg::Store => Location::Store,
        }
    }
}

async fn connect(config: &AppConfig) -> Result<StockLedger> {
    let (ledger, event_rx) = StockLedger::connect(config)
        .await
        .context("failed to connect to database")?;
    tokio::spawn(process_events(event_rx));
    Ok(ledger)
}

async fn handle_migrate(config: &AppConfig) -> Result<()> {
    let pool = db::establish_connection_from_app_config(config)
        .await
        .context("failed to connect to database")?;
    db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;
    db::close_pool(pool).await.context("failed to close pool")?;
    println!("Migrations applied");
    Ok(())
}

async fn handle_on_hand(ledger: &StockLedger, args: OnHandArgs, json: bool) -> Result<()> {
    let location = Location::from(args.location);
    let item = ledger
        .items
        .find_item(args.item)
        .await
        .with_context(|| format!("failed to load item {}", args.item))?;
    let batch_sum = ledger
        .batches
        .available(item.id, location)
        .await
        .context("failed to sum batches")?;

    #[derive(Serialize)]
    struct OnHand {
        item_id: i64,
        name: String,
        location: Location,
        on_hand: rust_decimal::Decimal,
        batch_sum: rust_decimal::Decimal,
    }

    let report = OnHand {
        item_id: item.id,
        name: item.name.clone(),
        location,
        on_hand: item.on_hand(location),
        batch_sum,
    };

    if json {
        print_json(&report)?;
    } else {
        println!(
            "{} (#{}) at {}: {} on hand, {} in open batches",
            report.name, report.item_id, report.location, report.on_hand, report.batch_sum
        );
    }
    Ok(())
}

async fn handle_drift(ledger: &StockLedger, args: ItemFilterArgs, json: bool) -> Result<()> {
    let reports = ledger
        .detect_drift(args.item)
        .await
        .context("drift scan failed")?;

    if json {
        return print_json(&reports);
    }
    if reports.is_empty() {
        println!("No drift found");
        return Ok(());
    }
    for report in &reports {
        println!(
            "- {} (#{}) at {}: registry {} vs batches {} ({})",
            report.item_name,
            report.item_id,
            report.location,
            report.registry_quantity,
            report.batch_sum,
            if report.is_repairable() {
                "repairable"
            } else {
                "needs review"
            }
        );
    }
    Ok(())
}

async fn handle_reconcile(ledger: &StockLedger, args: ItemFilterArgs, json: bool) -> Result<()> {
    let corrections = ledger
        .reconcile(args.item)
        .await
        .context("reconciliation failed")?;

    if json {
        return print_json(&corrections);
    }
    if corrections.is_empty() {
        println!("Nothing to correct");
        return Ok(());
    }
    for correction in &corrections {
        println!(
            "- item #{} at {}: {} units @ {} ({}, batch {})",
            correction.item_id,
            correction.location,
            correction.deficit,
            correction.unit_cost,
            correction.receipt_number,
            correction.batch.id
        );
    }
    Ok(())
}

async fn handle_low_stock(ledger: &StockLedger, json: bool) -> Result<()> {
    let items = ledger.low_stock().await.context("low stock query failed")?;

    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("No items at or below reorder level");
        return Ok(());
    }
    for item in &items {
        println!(
            "- {} (#{}): {} total, reorder at {}",
            item.name,
            item.id,
            item.total_quantity(),
            item.reorder_level
        );
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
