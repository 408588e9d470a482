//! # perp-runner
//!
//! Command-line entry point for the execution engine.
//!
//! Loads a JSON configuration file, builds one exchange client and one engine
//! for this process, runs a single command and prints its structured result as
//! JSON on stdout. Failures print an error report and exit with status 1.
//!
//! # Usage
//!
//! ```bash
//! perp-runner config.json status BTCUSDT
//! perp-runner config.json open BTCUSDT LONG 500 5 --stop-loss 61000 --take-profit 68000
//! perp-runner config.json plan decision.json
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use perp_core::config::ModuleMeta;
use perp_core::{MarginType, PerpError, PlannedAction, PositionDirection};
use perp_exec::{Engine, ErrorReport, ExecutionConfig, OpenRequest, ProtectionPolicy, TradingPlan};
use perp_td::FuturesApi;
use perp_td::aster::AsterClient;
use perp_td::aster::config::AsterTdConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info};

/// Perpetual futures execution engine.
#[derive(Parser)]
#[command(name = "perp-runner", about = "Perpetual futures execution engine")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Optional log directory for file output. Overrides the config file.
    #[arg(long)]
    log_dir: Option<String>,

    /// Emit console logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Account, position and open orders for a symbol.
    Status { symbol: String },
    /// Current position for a symbol.
    Position { symbol: String },
    /// Open orders for a symbol.
    Orders { symbol: String },
    /// Account summary and open positions.
    Account { symbol: Option<String> },
    /// Open or add to a position (closes an opposite position first).
    Open {
        symbol: String,
        #[arg(value_parser = parse_direction)]
        direction: PositionDirection,
        /// Order notional in USD.
        size_usd: Decimal,
        leverage: u32,
        /// Limit price; market order when omitted.
        #[arg(long)]
        entry_price: Option<Decimal>,
        #[arg(long)]
        stop_loss: Option<Decimal>,
        #[arg(long)]
        take_profit: Option<Decimal>,
    },
    /// Close a percentage of the position (default: all of it).
    Close {
        symbol: String,
        #[arg(long, default_value = "100")]
        percent: Decimal,
    },
    /// Reduce the position by a percentage and resize protection.
    Reduce { symbol: String, percent: Decimal },
    /// Update stop-loss / take-profit.
    Protect {
        symbol: String,
        #[arg(long)]
        stop_loss: Option<Decimal>,
        #[arg(long)]
        take_profit: Option<Decimal>,
    },
    /// Prepare the symbol for a planned action.
    Prepare {
        symbol: String,
        #[arg(value_parser = parse_action)]
        action: PlannedAction,
        #[arg(long)]
        stop_loss: Option<Decimal>,
        #[arg(long)]
        take_profit: Option<Decimal>,
    },
    /// Set leverage.
    Leverage { symbol: String, leverage: u32 },
    /// Set margin mode (ISOLATED or CROSSED).
    Margin {
        symbol: String,
        #[arg(value_parser = parse_margin_type)]
        margin_type: MarginType,
    },
    /// Cancel one order.
    Cancel { symbol: String, order_id: u64 },
    /// Cancel every open order on a symbol.
    CancelAll { symbol: String },
    /// Execute a trading plan from a JSON file.
    Plan { path: PathBuf },
    /// Market snapshot: mark price, ticker, book, candles, funding, open interest.
    Market {
        symbol: String,
        #[arg(long, default_value = "1h")]
        interval: String,
        #[arg(long, default_value_t = 24)]
        limit: u32,
    },
}

/// Top-level configuration file.
#[derive(Deserialize)]
struct RunnerConfig {
    #[serde(default)]
    runtime: ModuleMeta,
    exchange: AsterTdConfig,
    #[serde(default)]
    protection: ProtectionPolicy,
    #[serde(default)]
    execution: ExecutionConfig,
}

fn parse_direction(raw: &str) -> std::result::Result<PositionDirection, String> {
    match raw.to_ascii_uppercase().as_str() {
        "LONG" | "BUY" => Ok(PositionDirection::Long),
        "SHORT" | "SELL" => Ok(PositionDirection::Short),
        other => Err(format!("expected LONG or SHORT, got {other}")),
    }
}

fn parse_margin_type(raw: &str) -> std::result::Result<MarginType, String> {
    MarginType::parse(raw).ok_or_else(|| format!("expected ISOLATED or CROSSED, got {raw}"))
}

fn parse_action(raw: &str) -> std::result::Result<PlannedAction, String> {
    serde_json::from_value(Value::String(raw.to_ascii_uppercase()))
        .map_err(|_| format!("expected LONG, SHORT, HOLD, EXIT or REDUCE, got {raw}"))
}

fn to_json<T: Serialize>(value: T) -> perp_core::Result<Value> {
    serde_json::to_value(value).map_err(|e| PerpError::Parse(e.to_string()))
}

async fn run(command: Command, client: &AsterClient, engine: &Engine) -> perp_core::Result<Value> {
    match command {
        Command::Status { symbol } => to_json(engine.get_status(&symbol).await?),
        Command::Position { symbol } => to_json(engine.get_position(&symbol).await?),
        Command::Orders { symbol } => to_json(engine.get_open_orders(&symbol).await?),
        Command::Account { symbol } => to_json(engine.get_account_info(symbol.as_deref()).await?),
        Command::Open {
            symbol,
            direction,
            size_usd,
            leverage,
            entry_price,
            stop_loss,
            take_profit,
        } => {
            let request = OpenRequest {
                symbol,
                direction,
                notional_usd: size_usd,
                leverage,
                entry_price,
                stop_loss,
                take_profit,
            };
            to_json(engine.open(&request).await?)
        }
        Command::Close { symbol, percent } => to_json(engine.close(&symbol, percent).await?),
        Command::Reduce { symbol, percent } => to_json(engine.reduce(&symbol, percent).await?),
        Command::Protect {
            symbol,
            stop_loss,
            take_profit,
        } => to_json(engine.update_protection(&symbol, stop_loss, take_profit).await?),
        Command::Prepare {
            symbol,
            action,
            stop_loss,
            take_profit,
        } => to_json(
            engine
                .prepare_environment(&symbol, action, stop_loss, take_profit)
                .await?,
        ),
        Command::Leverage { symbol, leverage } => to_json(engine.set_leverage(&symbol, leverage).await?),
        Command::Margin { symbol, margin_type } => {
            to_json(engine.set_margin_mode(&symbol, margin_type).await?)
        }
        Command::Cancel { symbol, order_id } => to_json(engine.cancel_order(&symbol, order_id).await?),
        Command::CancelAll { symbol } => to_json(engine.cancel_all_orders(&symbol).await?),
        Command::Plan { path } => {
            let plan: TradingPlan = perp_core::config::load_json(&path)
                .map_err(|e| PerpError::Upstream(format!("trading plan unavailable: {e:#}")))?;
            to_json(engine.execute_plan(&plan).await?)
        }
        Command::Market {
            symbol,
            interval,
            limit,
        } => Ok(json!({
            "success": true,
            "symbol": symbol,
            "mark": to_json(client.mark_price(&symbol).await?)?,
            "ticker_24hr": to_json(client.ticker_24hr(&symbol).await?)?,
            "depth": to_json(client.depth(&symbol, 10).await?)?,
            "klines": to_json(client.klines(&symbol, &interval, limit).await?)?,
            "funding_rates": to_json(client.funding_rate_history(&symbol, 10).await?)?,
            "open_interest": to_json(client.open_interest(&symbol).await?)?,
            "leverage_brackets": to_json(client.leverage_brackets(&symbol, false).await?)?,
        })),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config: RunnerConfig = perp_core::config::load_json(&cli.config)?;

    // 2. Initialize logging (CLI flags win over the config file)
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.runtime.log_level.clone())
        .unwrap_or_else(|| "info".into());
    let log_dir = cli.log_dir.clone().or_else(|| config.runtime.log_path.clone());
    let module_name = config.runtime.module_name_or("perp-runner");
    perp_core::logging::init_logging(&level, log_dir.as_deref(), &module_name, cli.json_logs);
    info!(
        "[runner] starting, config={} rest_url={}",
        cli.config.display(),
        config.exchange.rest_url
    );

    // 3. One client and one engine per process
    let client = Arc::new(AsterClient::new(&config.exchange)?);
    let api: Arc<dyn FuturesApi> = client.clone();
    let engine = Engine::new(api, config.protection, config.execution);

    // 4. Run the command and print its result
    match run(cli.command, &client, &engine).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) => {
            error!("[runner] command failed: {err}");
            println!("{}", serde_json::to_string_pretty(&ErrorReport::from(&err))?);
            std::process::exit(1);
        }
    }
}
