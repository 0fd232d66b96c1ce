//! Multisig Wrap CLI
//!
//! Operator tool for inspecting multisig authorities and driving their
//! pending work to execution.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use multisig_wrap_core::{
    Backend, KeypairSigner, SignerProvider, Wrapper,
    config::{DispatchConfig, GOVERNANCE_PROGRAM_ID, GoverningSide, LedgerConfig, SMART_WALLET_PROGRAM_ID},
    dispatch::{BackendOptions, detect},
    governance::Voter,
    ledger::{LedgerClient, RpcLedger},
};
use serde::Deserialize;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, read_keypair_file},
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "multisig-wrap")]
#[command(about = "Multisig authority CLI", version)]
struct Cli {
    /// RPC endpoint; overrides the config file
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// JSON file with `ledger` and `dispatch` sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Propose with the community mint instead of the council mint
    #[arg(long, global = true)]
    community: bool,

    /// Keypair file used as payer, proposer and member
    /// [default: ~/.config/solana/id.json]
    #[arg(short, long, global = true)]
    keypair: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an authority address
    Detect {
        /// Authority address
        address: String,
    },

    /// List transactions or proposals awaiting approval or execution
    Pending {
        /// Authority address
        address: String,
    },

    /// Approve or vote with the keypair, then execute what is ready
    Execute {
        /// Authority address
        address: String,
    },

    /// Show version and default program ids
    Info,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    ledger: Option<LedgerConfig>,
    #[serde(default)]
    dispatch: Option<DispatchConfig>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

struct Session {
    ledger: Arc<dyn LedgerClient>,
    dispatch: DispatchConfig,
    signer: Arc<dyn SignerProvider>,
}

/// Keypair path the Solana CLI uses by default
fn default_keypair_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("solana").join("id.json"))
}

/// Load the operator keypair.
///
/// An explicit path must exist. Without one the default path is tried; if it
/// is absent only read-only commands proceed, with a throwaway payer that
/// never signs.
fn load_keypair(explicit: Option<&Path>, default: Option<PathBuf>, signs: bool) -> Result<Keypair> {
    let read = |path: &Path| read_keypair_file(path).map_err(|e| anyhow!("reading keypair {}: {}", path.display(), e));

    if let Some(path) = explicit {
        return read(path);
    }
    match default {
        Some(path) if path.exists() => read(&path),
        _ if signs => Err(anyhow!(
            "no keypair: pass --keypair or create the default Solana CLI keypair"
        )),
        _ => Ok(Keypair::new()),
    }
}

impl Session {
    fn new(cli: &Cli, signs: bool) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let mut ledger_config = file.ledger.unwrap_or_else(LedgerConfig::devnet);
        if let Some(url) = &cli.rpc_url {
            ledger_config.rpc_urls = vec![url.clone()];
        }
        ledger_config.validate()?;

        let mut dispatch = file.dispatch.unwrap_or_default();
        if cli.community {
            dispatch = dispatch.with_side(GoverningSide::Community);
        }

        let keypair = Arc::new(load_keypair(cli.keypair.as_deref(), default_keypair_path(), signs)?);

        Ok(Self {
            ledger: Arc::new(RpcLedger::new(ledger_config, keypair.clone())?),
            dispatch,
            signer: Arc::new(KeypairSigner::from_arc(keypair)),
        })
    }

    async fn detect(&self, address: &str) -> Result<Backend> {
        let address = Pubkey::from_str(address).with_context(|| format!("invalid address {}", address))?;
        let options = BackendOptions::default().with_proposer(self.signer.clone());
        detect(address, self.ledger.clone(), &self.dispatch, &options)
            .await?
            .ok_or_else(|| anyhow!("{} is not a multisig authority", address))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    match &cli.command {
        Commands::Detect { address } => {
            let session = Session::new(&cli, false)?;
            show_backend(&session.detect(address).await?);
        }
        Commands::Pending { address } => {
            let session = Session::new(&cli, false)?;
            show_pending(&session.detect(address).await?).await?;
        }
        Commands::Execute { address } => {
            let session = Session::new(&cli, true)?;
            let backend = session.detect(address).await?;
            execute_pending(&session, &backend).await?;
        }
        Commands::Info => show_info(),
    }

    Ok(())
}

fn show_backend(backend: &Backend) {
    println!("Backend:    {}", backend.kind());
    println!("Program:    {}", backend.program_id());
    println!("Host:       {}", backend.host());
    println!("Signing as: {}", backend.signing_by());
    if let Some(gov) = backend.as_governance() {
        println!("Side:       {}", gov.side());
        println!("Version:    {}", gov.version());
    }
}

async fn show_pending(backend: &Backend) -> Result<()> {
    match backend {
        Backend::SmartWallet(wallet) => {
            let threshold = wallet.wallet().await?.threshold;
            let pending = wallet.pending_transactions().await?;
            println!("{} pending transaction(s)", pending.len());
            for (index, tx) in pending {
                println!(
                    "  #{:<4} {}  {}/{} approvals  {} instruction(s)",
                    index,
                    tx.status(threshold),
                    tx.approvals(),
                    threshold,
                    tx.instructions.len()
                );
            }
        }
        Backend::Governance(gov) => {
            let pending = gov.pending_proposals().await?;
            println!("{} pending proposal(s)", pending.len());
            for (address, proposal) in pending {
                println!(
                    "  {}  {:<10} yes {}  {} transaction(s)",
                    address,
                    proposal.state,
                    proposal.yes_vote_weight(),
                    proposal.transactions_count()
                );
            }
        }
    }
    Ok(())
}

async fn execute_pending(session: &Session, backend: &Backend) -> Result<()> {
    let receipts = match backend {
        Backend::SmartWallet(wallet) => wallet.execute_all_pending(&[session.signer.clone()]).await?,
        Backend::Governance(gov) => gov.execute_all_pending(&[Voter::new(session.signer.clone())]).await?,
    };
    info!("Submitted {} transaction(s)", receipts.len());
    for receipt in receipts {
        println!("{}", receipt);
    }
    Ok(())
}

fn show_info() {
    println!("Multisig Wrap v{}", multisig_wrap_core::VERSION);
    println!();
    println!("Default programs:");
    println!("  Smart wallet: {}", SMART_WALLET_PROGRAM_ID);
    println!("  Governance:   {}", GOVERNANCE_PROGRAM_ID);
    println!();
    println!("Backends:");
    println!("  - Smart wallet: propose, approve, execute");
    println!("  - Governance:   propose, vote, execute (governance or native treasury)");
}
