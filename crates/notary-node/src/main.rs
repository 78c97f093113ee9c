//! notary-node — the Open-Transactions Notary Core full-node binary.
//!
//! Startup sequence:
//!   1. Open (or initialise) the state database and this notary's signing key
//!   2. Bootstrap the notary's own identity and any configured units
//!   3. Wire notary-ledger + notary-cron + notary-market + notary-cash behind
//!      one `RpcServerState`
//!   4. Start the JSON-RPC 2.0 server
//!   5. Run the Cron scheduler loop, ticking at a fixed interval

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};

use notary_cash::{CashEngine, SpendLedger};
use notary_core::types::{NotaryId, UnitId};
use notary_cron::Cron;
use notary_crypto::KeyPair;
use notary_ledger::{LedgerEngine, Notary, StateDb, Unit};
use notary_market::{MarketEngine, TradeCronHandler};
use notary_rpc::server::CashBook;
use notary_rpc::{RpcServer, RpcServerState};

#[derive(Parser, Debug)]
#[command(
    name = "notary-node",
    version,
    about = "Open-Transactions Notary Core node — a transaction-number notary, not a ledger of its own money"
)]
struct Args {
    /// Directory for the persistent state database and signing key.
    #[arg(long, default_value = "~/.notary/data")]
    data_dir: PathBuf,

    /// JSON-RPC listen address.
    #[arg(long, default_value = "127.0.0.1:8645")]
    rpc_addr: SocketAddr,

    /// Path to a JSON file of units to register on first run, e.g.
    /// `[{"symbol": "USD", "scale": 100}]`.
    #[arg(long)]
    bootstrap_units: Option<PathBuf>,

    /// Cron tick interval in milliseconds (§4.4/§4.5 periodic processing).
    #[arg(long, default_value_t = 1000)]
    tick_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
struct BootstrapUnit {
    symbol: String,
    scale: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,notary=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("notary node starting");

    // ── State database & signing key ─────────────────────────────────────────
    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir).with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let db = Arc::new(StateDb::open(&data_dir).context("opening state database")?);
    let keypair = Arc::new(load_or_generate_keypair(&data_dir).context("loading signing key")?);
    let notary_id = NotaryId::of(&keypair.public_key.0);
    info!(%notary_id, "notary identity");

    let ledger = LedgerEngine::new(Arc::clone(&db), notary_id.clone());
    if db.get_self_notary().context("reading self notary record")?.is_none() {
        info!("fresh database — bootstrapping self notary record");
        ledger
            .bootstrap_self(Notary { notary_id: notary_id.clone(), public_key: keypair.public_key.clone() })
            .context("bootstrapping self notary record")?;
        if let Some(path) = &args.bootstrap_units {
            bootstrap_units(&ledger, &notary_id, path).context("bootstrapping units")?;
        }
    } else {
        info!("existing database found — skipping bootstrap");
    }

    // ── Cron + Market + Cash ──────────────────────────────────────────────────
    let cron = Arc::new(Mutex::new(Cron::new()));

    let sign_keypair = Arc::clone(&keypair);
    let market_engine = MarketEngine::new(Arc::clone(&db), notary_id.clone());
    let trades = Arc::new(TradeCronHandler::new(
        market_engine,
        Arc::new(move |bytes: &[u8]| sign_keypair.sign(bytes)),
    ));

    let spent_db = sled::open(data_dir.join("spent_tokens")).context("opening spend-ledger database")?;
    let spend_ledger = SpendLedger::open(&spent_db, &data_dir).context("opening spend ledger")?;
    let cash = Mutex::new(CashBook::new(CashEngine::new(Arc::clone(&db), spend_ledger)));

    let state = Arc::new(RpcServerState { ledger, cron: Arc::clone(&cron), trades, cash, keypair });
    state.register_trade_handler();

    // ── RPC server ────────────────────────────────────────────────────────────
    let _rpc_handle = RpcServer::new(Arc::clone(&state))
        .start(args.rpc_addr)
        .await
        .context("starting RPC server")?;

    // ── Cron scheduler loop (§4.4/§4.5) ───────────────────────────────────────
    info!(tick_interval_ms = args.tick_interval_ms, "node ready");
    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_interval_ms));
    loop {
        ticker.tick().await;
        let now = now_unix();
        if let Err(e) = cron.lock().expect("cron lock poisoned").tick(now) {
            warn!(error = %e, "cron tick failed");
        }
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as i64
}

/// Register every unit named in a bootstrap-units JSON file, issued by this
/// notary's own Nym (a notary may issue its own units on first run; issuance
/// by other Nyms happens through a future `registerUnit` wire command).
fn bootstrap_units(ledger: &LedgerEngine, notary_id: &NotaryId, path: &Path) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading bootstrap units from {}", path.display()))?;
    let units: Vec<BootstrapUnit> = serde_json::from_str(&json).context("parsing bootstrap units JSON")?;
    let issuer = notary_core::types::NymId::from_bytes(*notary_id.as_bytes());
    for unit in units {
        let unit_id = UnitId::of(unit.symbol.as_bytes());
        info!(symbol = %unit.symbol, scale = unit.scale, "registering bootstrap unit");
        ledger
            .register_unit(Unit { unit_id, issuer: issuer.clone(), symbol: unit.symbol, scale: unit.scale })
            .context("registering unit")?;
    }
    Ok(())
}

/// Load this notary's Dilithium keypair from `<data_dir>/notary.key`,
/// generating and persisting a fresh one on first run.
fn load_or_generate_keypair(data_dir: &Path) -> anyhow::Result<KeyPair> {
    let key_path = data_dir.join("notary.key");
    if key_path.exists() {
        let bytes = std::fs::read(&key_path).with_context(|| format!("reading signing key from {}", key_path.display()))?;
        return bincode::deserialize(&bytes).context("decoding signing key");
    }
    warn!(path = %key_path.display(), "no signing key found — generating a fresh one");
    let keypair = KeyPair::generate();
    let bytes = bincode::serialize(&keypair).context("encoding fresh signing key")?;
    std::fs::write(&key_path, bytes).with_context(|| format!("writing signing key to {}", key_path.display()))?;
    Ok(keypair)
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
