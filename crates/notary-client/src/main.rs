//! notary-client — OTX client state machine (C9) CLI.
//!
//! Usage:
//!   notary-client keygen    [--keyfile <path>]
//!   notary-client register  [--rpc <url>] [--keyfile <path>]
//!   notary-client nymbox    [--rpc <url>] [--keyfile <path>]
//!   notary-client numbers   --count <n> [--rpc <url>] [--keyfile <path>]
//!   notary-client register-account --unit <unitId> [--rpc <url>] [--keyfile <path>]
//!   notary-client deposit-cheque --unit <unitId> [--account <id>] --voucher-json <path> [--rpc <url>] [--keyfile <path>]
//!   notary-client transfer  --from <account> --to <account> --amount <n> [--rpc <url>] [--keyfile <path>]
//!   notary-client withdraw-cash --account <id> --denominations <n,n,...> --owner-unlock-key <hex> [--rpc <url>] [--keyfile <path>]
//!   notary-client deposit-cash --account <id> --tokens-json <path> [--rpc <url>] [--keyfile <path>]
//!   notary-client withdraw-voucher --account <id> --amount <n> [--rpc <url>] [--keyfile <path>]
//!   notary-client account    --account <id> [--rpc <url>]
//!   notary-client markets    [--rpc <url>]
//!   notary-client offers     --market <id> [--rpc <url>]
//!   notary-client trades     --market <id> [--rpc <url>]
//!   notary-client issue-offer --offer-json <path> [--rpc <url>] [--keyfile <path>]
//!   notary-client kill-offer --opening-num <n> [--rpc <url>] [--keyfile <path>]
//!   notary-client activate-contract --opening-num <n> [--rpc <url>] [--keyfile <path>]
//!   notary-client trigger-clause --opening-num <n> --clause <name> [--rpc <url>] [--keyfile <path>]
//!   notary-client delete-account --account <id> [--rpc <url>] [--keyfile <path>]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use notary_crypto::KeyPair;

mod rpc_client;
mod state_machine;

use rpc_client::NotaryRpcClient;
use state_machine::{ClientStateMachine, Task};

#[derive(Parser, Debug)]
#[command(
    name = "notary-client",
    version,
    about = "Open-Transactions Notary Core client — drives the C9 task-queue state machine against a notary-node"
)]
struct Args {
    /// Path to this Nym's keyfile (JSON).
    #[arg(long, global = true, default_value = "~/.notary/client.json")]
    keyfile: PathBuf,

    /// Notary RPC endpoint.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8645")]
    rpc: String,

    /// Hex-encoded NotaryId this context talks to. Only needed for
    /// bookkeeping — the client trusts whatever `--rpc` answers.
    #[arg(long, global = true, default_value = "")]
    notary_id: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new Dilithium2 keypair and save to the keyfile.
    Keygen,

    /// Register this Nym with the notary.
    Register,

    /// Download and process this Nym's Nymbox.
    Nymbox,

    /// Request a batch of fresh transaction numbers.
    Numbers {
        #[arg(long, default_value_t = 5)]
        count: u32,
    },

    /// Register a new account under a unit.
    RegisterAccount {
        #[arg(long)]
        unit: String,
    },

    /// Deposit a voucher (cheque) into an account, registering one first if
    /// `--account` is omitted.
    DepositCheque {
        #[arg(long)]
        unit: String,
        #[arg(long)]
        account: Option<String>,
        #[arg(long)]
        voucher_json: PathBuf,
    },

    /// Transfer between two of this notary's accounts.
    Transfer {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: i128,
    },

    /// Withdraw cash tokens from an account.
    WithdrawCash {
        #[arg(long)]
        account: String,
        /// Comma-separated denominations, e.g. "100,100,500".
        #[arg(long, value_delimiter = ',')]
        denominations: Vec<i128>,
        #[arg(long)]
        owner_unlock_key: String,
    },

    /// Deposit cash tokens (read from a JSON file) into an account.
    DepositCash {
        #[arg(long)]
        account: String,
        #[arg(long)]
        tokens_json: PathBuf,
    },

    /// Withdraw a signed voucher (cheque) from an account.
    WithdrawVoucher {
        #[arg(long)]
        account: String,
        #[arg(long)]
        amount: i128,
    },

    /// Print an account's data and inbox.
    Account {
        #[arg(long)]
        account: String,
    },

    /// List known markets.
    Markets,

    /// List resting offers on a market.
    Offers {
        #[arg(long)]
        market: String,
    },

    /// List recent trades on a market.
    Trades {
        #[arg(long)]
        market: String,
    },

    /// Issue a market offer described by a JSON file.
    IssueOffer {
        #[arg(long)]
        offer_json: PathBuf,
    },

    /// Cancel a resting market offer.
    KillOffer {
        #[arg(long)]
        opening_num: u64,
    },

    /// Delete an asset account.
    DeleteAccount {
        #[arg(long)]
        account: String,
    },

    /// Activate a smart contract previously issued onto Cron.
    ActivateContract {
        #[arg(long)]
        opening_num: u64,
    },

    /// Trigger a named clause on an active smart contract.
    TriggerClause {
        #[arg(long)]
        opening_num: u64,
        #[arg(long)]
        clause: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn,notary_client=info").init();

    let args = Args::parse();
    let keyfile = expand_tilde(&args.keyfile);

    if let Command::Keygen = args.command {
        return cmd_keygen(&keyfile);
    }

    let keypair = Arc::new(load_keypair(&keyfile)?);
    let nym_id = keypair.nym_id.to_hex();
    let rpc = Arc::new(NotaryRpcClient::connect(&args.rpc).context("connecting to notary RPC endpoint")?);
    let mut sm = ClientStateMachine::new(nym_id, args.notary_id.clone(), keypair, rpc);

    match args.command {
        Command::Keygen => unreachable!("handled above"),

        Command::Register => {
            let handle = sm.enqueue(Task::RegisterNym);
            sm.run_until_idle().await?;
            print_result("Registered. Request number:", handle.wait().await?)
        }

        Command::Nymbox => {
            let handle = sm.enqueue(Task::DownloadNymbox);
            sm.run_until_idle().await?;
            print_result("Nymbox entries processed:", handle.wait().await?)
        }

        Command::Numbers { count } => {
            let handle = sm.enqueue(Task::GetTransactionNumbers { count });
            sm.run_until_idle().await?;
            print_result("Issued transaction numbers:", handle.wait().await?)
        }

        Command::RegisterAccount { unit } => {
            let unit_id = unit.clone();
            let handle = sm.enqueue(Task::RegisterAccount { unit_id });
            sm.run_until_idle().await?;
            print_result("Account registered:", handle.wait().await?)
        }

        Command::DepositCheque { unit, account, voucher_json } => {
            let voucher = read_json(&voucher_json)?;
            let handle = sm.enqueue(Task::DepositCheque { account_id: account, unit_id: unit, voucher });
            sm.run_until_idle().await?;
            print_result("Deposit result:", handle.wait().await?)
        }

        Command::Transfer { from, to, amount } => {
            let handle = sm.enqueue(Task::SendPayment { from, to, amount });
            sm.run_until_idle().await?;
            print_result("Transfer result:", handle.wait().await?)
        }

        Command::WithdrawCash { account, denominations, owner_unlock_key } => {
            let owner_unlock_key_hex = owner_unlock_key;
            let handle = sm.enqueue(Task::WithdrawCash { account_id: account, denominations, owner_unlock_key_hex });
            sm.run_until_idle().await?;
            print_result("Withdrawn tokens:", handle.wait().await?)
        }

        Command::DepositCash { account, tokens_json } => {
            let tokens = read_json(&tokens_json)?;
            let handle = sm.enqueue(Task::DepositCash { account_id: account, tokens });
            sm.run_until_idle().await?;
            print_result("New balance:", handle.wait().await?)
        }

        Command::WithdrawVoucher { account, amount } => {
            let handle = sm.enqueue(Task::WithdrawVoucher { account_id: account, amount });
            sm.run_until_idle().await?;
            print_result("Voucher:", handle.wait().await?)
        }

        Command::Account { account } => {
            let (account, inbox) = sm.get_account_data(&account).await?;
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "account": account, "inbox": inbox }))?);
            Ok(())
        }

        Command::Markets => {
            let markets = sm.get_market_list().await?;
            println!("{}", serde_json::to_string_pretty(&markets)?);
            Ok(())
        }

        Command::Offers { market } => {
            let offers = sm.get_market_offers(&market).await?;
            println!("{}", serde_json::to_string_pretty(&offers)?);
            Ok(())
        }

        Command::Trades { market } => {
            let trades = sm.get_market_recent_trades(&market).await?;
            println!("{}", serde_json::to_string_pretty(&trades)?);
            Ok(())
        }

        Command::IssueOffer { offer_json } => {
            let offer = read_json(&offer_json)?;
            let handle = sm.enqueue(Task::IssueMarketOffer { offer });
            sm.run_until_idle().await?;
            print_result("Offer opening number:", handle.wait().await?)
        }

        Command::KillOffer { opening_num } => {
            let handle = sm.enqueue(Task::KillMarketOffer { opening_num });
            sm.run_until_idle().await?;
            print_result("Offer killed:", handle.wait().await?)
        }

        Command::DeleteAccount { account } => {
            let handle = sm.enqueue(Task::DeleteAssetAccount { account_id: account });
            sm.run_until_idle().await?;
            print_result("Account deleted:", handle.wait().await?)
        }

        Command::ActivateContract { opening_num } => {
            let handle = sm.enqueue(Task::ActivateSmartContract { opening_num });
            sm.run_until_idle().await?;
            print_result("Contract activated:", handle.wait().await?)
        }

        Command::TriggerClause { opening_num, clause } => {
            let handle = sm.enqueue(Task::TriggerClause { opening_num, clause });
            sm.run_until_idle().await?;
            print_result("Clause result:", handle.wait().await?)
        }
    }
}

fn print_result(label: &str, value: serde_json::Value) -> anyhow::Result<()> {
    println!("{label} {}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {} as JSON", path.display()))
}

fn cmd_keygen(keyfile: &PathBuf) -> anyhow::Result<()> {
    if keyfile.exists() {
        bail!("Keyfile {} already exists. Delete it first to generate a new key.", keyfile.display());
    }
    if let Some(parent) = keyfile.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let kp = KeyPair::generate();
    let json = serde_json::to_string_pretty(&kp)?;
    std::fs::write(keyfile, &json).with_context(|| format!("writing keyfile to {}", keyfile.display()))?;

    println!("Generated new keypair.");
    println!("Nym ID:     {}", kp.nym_id.to_hex());
    println!("Public key: {}", hex::encode(&kp.public_key.0));
    println!("Keyfile:    {}", keyfile.display());
    println!("\nBACK UP YOUR KEYFILE. Loss = permanent loss of access to your accounts.");
    Ok(())
}

fn load_keypair(keyfile: &PathBuf) -> anyhow::Result<KeyPair> {
    let json = std::fs::read_to_string(keyfile).with_context(|| format!("reading keyfile {}", keyfile.display()))?;
    serde_json::from_str(&json).context("parsing keyfile — is it a valid notary-client keyfile?")
}

fn expand_tilde(path: &PathBuf) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.clone()
}
