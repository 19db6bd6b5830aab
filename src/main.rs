//! Trading Orchestrator - Main Entry Point
//!
//! Places simple orders and runs OCO, TWAP and grid strategies against
//! Binance USDⓈ-M futures, or against the simulated exchange with `--dry-run`.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use trading_orchestrator::config::{load_config, AppConfig};
use trading_orchestrator::strategy::{
    duration_from_minutes, CancelResult, EntryKind, FailurePolicy, GridPlacer, GridRequest,
    LevelOutcome, OcoRequest, OcoWatcher, OrderPlacer, Outcome, StopSignal, StrategyContext,
    TwapRequest, TwapScheduler,
};
use trading_orchestrator::{BinanceClient, SharedExchange, Side, SimulatedExchange, TimeInForce};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Log level (trace, debug, info, warn, error); defaults to the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Use the simulated exchange instead of Binance
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show non-zero balances
    Balance,

    /// Market order
    Market {
        symbol: String,
        side: Side,
        quantity: Decimal,
    },

    /// Limit order
    Limit {
        symbol: String,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        /// GTC, IOC or FOK
        #[arg(long, default_value = "GTC")]
        time_in_force: TimeInForce,
    },

    /// Stop-limit order
    StopLimit {
        symbol: String,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        stop_price: Decimal,
    },

    /// Entry with take-profit and stop-loss brackets
    Oco {
        symbol: String,
        side: Side,
        quantity: Decimal,
        take_profit: Decimal,
        stop_loss: Decimal,
        /// LIMIT entry at this price instead of MARKET
        #[arg(long)]
        entry_price: Option<Decimal>,
    },

    /// Split an order into equal slices over time
    Twap {
        symbol: String,
        side: Side,
        quantity: Decimal,
        slices: u32,
        /// Total duration in minutes
        minutes: u64,
        /// Send LIMIT slices instead of MARKET
        #[arg(long, requires = "limit_price")]
        use_limit: bool,
        #[arg(long)]
        limit_price: Option<Decimal>,
        #[arg(long)]
        abort_on_failure: bool,
    },

    /// Ladder of limit orders between two prices
    Grid {
        symbol: String,
        lower: Decimal,
        upper: Decimal,
        grids: u32,
        quantity: Decimal,
        /// Defaults to the current mark price
        #[arg(long)]
        reference_price: Option<Decimal>,
        #[arg(long)]
        abort_on_failure: bool,
        /// Replace filled levels for up to this many status sweeps
        #[arg(long, default_value_t = 0)]
        maintain: u32,
        /// Cancel the grid's resting orders on Ctrl-C
        #[arg(long)]
        cancel_on_stop: bool,
    },
}

fn failure_policy(abort_on_failure: bool) -> FailurePolicy {
    if abort_on_failure {
        FailurePolicy::AbortOnFirstFailure
    } else {
        FailurePolicy::ContinueOnError
    }
}

fn print_cancellations(results: &[CancelResult]) {
    for cancel in results {
        let price = cancel.price.map_or("-".to_string(), |p| p.to_string());
        match &cancel.result {
            Ok(handle) => println!("  canceled {:>14} {}", price, handle),
            Err(err) => println!("  cancel   {:>14} #{} FAILED {}", price, cancel.order_id, err),
        }
    }
}

fn build_exchange(config: &AppConfig, dry_run: bool) -> Result<SharedExchange> {
    if dry_run {
        info!("Dry run: using the simulated exchange");
        return Ok(Arc::new(SimulatedExchange::new(config.simulation.clone())));
    }

    if config.binance.credentials().is_none() {
        warn!("No Binance credentials configured; signed requests will fail");
    }
    let timeout = Duration::from_secs(config.settings.request_timeout_seconds);
    let client = BinanceClient::new(&config.binance, timeout)?;
    Ok(Arc::new(client))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let config = load_config(Some(&args.config))
        .with_context(|| format!("loading configuration from {}", args.config))?;

    // Initialize logging
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting trading orchestrator");
    info!("Configuration file: {}", args.config);

    let exchange = build_exchange(&config, args.dry_run)?;

    let stop = StopSignal::new();
    let ctrl_c_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, stopping at the next wait...");
            ctrl_c_stop.stop();
        }
    });

    let ctx = StrategyContext::new(exchange.clone(), &config.strategy).with_stop(stop);
    run(args.command, exchange, ctx).await
}

async fn run(command: Command, exchange: SharedExchange, ctx: StrategyContext) -> Result<()> {
    match command {
        Command::Balance => {
            let balances = exchange.get_balances().await?;
            println!("Balances ({}):", exchange.name());
            for (asset, amount) in balances.iter().filter(|(_, amount)| !amount.is_zero()) {
                println!("  {:<8} {}", asset, amount);
            }
        }

        Command::Market {
            symbol,
            side,
            quantity,
        } => {
            let handle = OrderPlacer::new(ctx).place_market(&symbol, side, quantity).await?;
            println!("Placed {}", handle);
        }

        Command::Limit {
            symbol,
            side,
            quantity,
            price,
            time_in_force,
        } => {
            let handle = OrderPlacer::new(ctx)
                .place_limit(&symbol, side, quantity, price, time_in_force)
                .await?;
            println!("Placed {}", handle);
        }

        Command::StopLimit {
            symbol,
            side,
            quantity,
            price,
            stop_price,
        } => {
            let handle = OrderPlacer::new(ctx)
                .place_stop_limit(&symbol, side, quantity, price, stop_price)
                .await?;
            println!("Placed {}", handle);
        }

        Command::Oco {
            symbol,
            side,
            quantity,
            take_profit,
            stop_loss,
            entry_price,
        } => {
            let request = OcoRequest {
                symbol,
                side,
                quantity,
                take_profit_price: take_profit,
                stop_loss_price: stop_loss,
                entry: entry_price.map_or(EntryKind::Market, |price| EntryKind::Limit { price }),
            };
            let report = OcoWatcher::new(ctx).run(&request).await?;
            println!("Entry        {}", report.entry);
            println!("Take-profit  {}", report.take_profit);
            println!("Stop-loss    {}", report.stop_loss);
            println!("{} filled, sibling {:?}", report.filled_leg, report.sibling);
        }

        Command::Twap {
            symbol,
            side,
            quantity,
            slices,
            minutes,
            use_limit,
            limit_price,
            abort_on_failure,
        } => {
            let request = TwapRequest {
                symbol,
                side,
                total_quantity: quantity,
                num_slices: slices,
                duration: duration_from_minutes(minutes)?,
                limit_price: if use_limit { limit_price } else { None },
            };
            let report = TwapScheduler::new(ctx, failure_policy(abort_on_failure))
                .run(&request)
                .await?;
            for slice in &report.slices {
                match &slice.result {
                    Ok(handle) => println!("  slice {:>3}  {}", slice.index + 1, handle),
                    Err(err) => println!("  slice {:>3}  FAILED {}", slice.index + 1, err),
                }
            }
            if report.stopped {
                println!("Stopped after {} slices", report.slices.len());
            }
            println!("TWAP {}", report.outcome());
            if report.outcome() == Outcome::Failure {
                bail!("no TWAP slice was placed");
            }
        }

        Command::Grid {
            symbol,
            lower,
            upper,
            grids,
            quantity,
            reference_price,
            abort_on_failure,
            maintain,
            cancel_on_stop,
        } => {
            let request = GridRequest {
                symbol,
                lower_price: lower,
                upper_price: upper,
                num_grids: grids,
                quantity_per_grid: quantity,
                reference_price,
            };
            let stop = ctx.stop.clone();
            let placer = GridPlacer::new(ctx, failure_policy(abort_on_failure));
            let report = placer.run(&request).await?;
            println!("Reference price {}", report.reference_price);
            for level in &report.levels {
                let side = level.side.map_or("-".to_string(), |s| s.to_string());
                match &level.outcome {
                    LevelOutcome::Placed(handle) => {
                        println!("  {:>3} {:>14} {:<4} {}", level.index, level.price, side, handle)
                    }
                    LevelOutcome::Failed(err) => {
                        println!("  {:>3} {:>14} {:<4} FAILED {}", level.index, level.price, side, err)
                    }
                    LevelOutcome::Skipped => {
                        println!("  {:>3} {:>14} {:<4} skipped (at reference)", level.index, level.price, side)
                    }
                    LevelOutcome::NotSubmitted => {
                        println!("  {:>3} {:>14} {:<4} not submitted", level.index, level.price, side)
                    }
                }
            }
            println!("Grid {}", report.outcome());
            if report.outcome() == Outcome::Failure {
                bail!("no grid level was placed");
            }

            let mut working: Vec<_> = report.placed().cloned().collect();
            if maintain > 0 {
                let maintenance = placer.maintain(&report, maintain).await?;
                for replacement in &maintenance.replacements {
                    match &replacement.result {
                        Ok(handle) => println!("  filled #{} -> {}", replacement.filled.order_id, handle),
                        Err(err) => println!(
                            "  filled #{} -> {} FAILED {}",
                            replacement.filled.order_id, replacement.side, err
                        ),
                    }
                }
                println!(
                    "Maintained grid for {} sweeps, {} orders working",
                    maintenance.sweeps,
                    maintenance.working.len()
                );
                working = maintenance.working;
            }

            if cancel_on_stop {
                if !stop.is_stopped() {
                    info!("Press Ctrl-C to cancel {} grid orders", working.len());
                    stop.stopped().await;
                }
                let results = placer.cancel_orders(&working).await;
                print_cancellations(&results);
                println!(
                    "Canceled {}/{} grid orders",
                    results.iter().filter(|c| c.result.is_ok()).count(),
                    results.len()
                );
            }
        }
    }

    Ok(())
}
