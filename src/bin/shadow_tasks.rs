mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use url::Url;

use shadow_protocol::chain::{
    ChainReader, JsonRpcClient, NodeAccountSigner, RpcChainReader, TransactionSigner,
};
use shadow_protocol::config::{ClientConfig, Deployment};
use shadow_protocol::devnet::{dev_account, DevNetwork};
use shadow_protocol::view::zone_label;
use shadow_protocol::{Address, ShadowApp, WalletSession, Zone, ZoneKind};

const LOG_TARGET: &str = "bin::shadow_tasks";
const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
const DEFAULT_GATEWAY_CHAIN_ID: u64 = 55815;
const DEFAULT_DEV_ACCOUNT: &str = "deployer";
const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Parser)]
#[command(name = "shadow_tasks")]
#[command(about = "Join zones and inspect players of a ShadowProtocol deployment", long_about = None)]
struct Args {
    /// JSON-RPC endpoint of the node
    #[arg(long, env = "SHADOW_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: Url,

    /// ShadowProtocol address; read from the deployments directory when omitted
    #[arg(long, env = "SHADOW_CONTRACT")]
    contract: Option<Address>,

    /// Account to act as. A dev-network label (e.g. `alice`) or an address
    #[arg(long, env = "SHADOW_ACCOUNT")]
    account: Option<String>,

    /// Use an in-process dev network persisted in this JSON file
    #[arg(long, env = "SHADOW_DEV_STATE")]
    dev_state: Option<PathBuf>,

    /// Directory holding `<network>/ShadowProtocol.json`
    #[arg(long, env = "SHADOW_DEPLOYMENTS_DIR", default_value = "deployments")]
    deployments_dir: PathBuf,

    /// Deployment network name
    #[arg(long, env = "SHADOW_NETWORK", default_value = "localhost")]
    network: String,

    /// Chain id of the decryption gateway
    #[arg(long, env = "SHADOW_GATEWAY_CHAIN_ID", default_value_t = DEFAULT_GATEWAY_CHAIN_ID)]
    gateway_chain_id: u64,

    /// Contract verifying user-decryption signatures on the gateway
    #[arg(long, env = "SHADOW_VERIFYING_CONTRACT")]
    verifying_contract: Option<Address>,

    /// Seconds to wait for a join transaction to be mined
    #[arg(long, env = "SHADOW_RECEIPT_TIMEOUT_SECS", default_value_t = DEFAULT_RECEIPT_TIMEOUT_SECS)]
    receipt_timeout_secs: u64,

    /// Toggle structured (JSON) logs
    #[arg(long, env = "SHADOW_LOG_JSON", default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Print the ShadowProtocol address
    Address,
    /// Join the shadow zone
    JoinShadow,
    /// Join the public zone
    JoinPublic,
    /// List players in the shadow and public zones
    ListPlayers,
    /// Print the acting account's player record
    Status,
}

/// Where the app talks to, plus the dev network to persist afterwards.
struct Session {
    app: ShadowApp,
    dev: Option<(DevNetwork, PathBuf)>,
}

impl Session {
    fn persist(&self) -> Result<()> {
        if let Some((network, path)) = &self.dev {
            network
                .save(path)
                .with_context(|| format!("failed to save dev state to {}", path.display()))?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    common::load_dotenv();
    let args = Args::parse();
    common::init_tracing(args.json)?;
    let command = args.command;
    let session = match &args.dev_state {
        Some(path) => dev_session(&args, path.clone())?,
        None => rpc_session(&args).await?,
    };
    run(command, &session).await?;
    session.persist()
}

fn dev_session(args: &Args, path: PathBuf) -> Result<Session> {
    let network = DevNetwork::load_or_new(&path)
        .with_context(|| format!("failed to load dev state from {}", path.display()))?;
    if args.contract.is_some() {
        warn!(target = LOG_TARGET, "ignoring --contract in dev mode");
    }
    let account = match args.account.as_deref() {
        Some(raw) => raw.parse::<Address>().unwrap_or_else(|_| dev_account(raw)),
        None => dev_account(DEFAULT_DEV_ACCOUNT),
    };
    let config = network.client_config();
    let relayer = network.relayer().with_domain(config.decryption_domain());

    let app = ShadowApp::new(config, Arc::new(network.clone()));
    app.connect(WalletSession::with_signer(Arc::new(network.signer(account))));
    app.set_decrypt_client(Some(Arc::new(relayer)));
    info!(target = LOG_TARGET, %account, path = %path.display(), "using dev network");
    Ok(Session {
        app,
        dev: Some((network, path)),
    })
}

async fn rpc_session(args: &Args) -> Result<Session> {
    let contract = match args.contract {
        Some(contract) => contract,
        None => {
            Deployment::load(&args.deployments_dir, &args.network)
                .context("pass --contract or deploy ShadowProtocol first")?
                .address
        }
    };
    let client = Arc::new(JsonRpcClient::new(args.rpc_url.clone()));
    let reader: Arc<dyn ChainReader> = Arc::new(RpcChainReader::new(client.clone()));
    let chain_id = reader
        .chain_id()
        .await
        .with_context(|| format!("node at {} is unreachable", args.rpc_url))?;

    let signer = match args.account.as_deref() {
        Some(raw) => {
            let address: Address = raw
                .parse()
                .with_context(|| format!("--account {raw} is not an address"))?;
            NodeAccountSigner::new(client, address)
        }
        None => NodeAccountSigner::first_account(client)
            .await
            .context("node does not expose an account to sign with")?,
    }
    .with_receipt_timeout(Duration::from_secs(args.receipt_timeout_secs));

    let config = ClientConfig::new(
        contract,
        args.gateway_chain_id,
        args.verifying_contract.unwrap_or_else(Address::zero),
    );
    let app = ShadowApp::new(config, reader);
    info!(
        target = LOG_TARGET,
        chain_id,
        %contract,
        account = %signer.address(),
        "connected to node"
    );
    app.connect(WalletSession::with_signer(Arc::new(signer)));
    Ok(Session { app, dev: None })
}

async fn run(command: Command, session: &Session) -> Result<()> {
    let app = &session.app;
    let contract = app.contract().address();
    match command {
        Command::Address => {
            println!("ShadowProtocol address is {contract}");
            match app.contract().protocol_id().await {
                Ok(id) => println!("Protocol id: {id}"),
                Err(err) => warn!(target = LOG_TARGET, error = %err, "protocol id unavailable"),
            }
        }
        Command::JoinShadow | Command::JoinPublic => {
            let zone = match command {
                Command::JoinShadow => ZoneKind::Shadow,
                _ => ZoneKind::Public,
            };
            let outcome = app.join_zone(zone).await?;
            let account = app.account().unwrap_or_else(Address::zero);
            info!(
                target = LOG_TARGET,
                tx_hash = %outcome.tx_hash,
                block = outcome.block_number,
                "join confirmed"
            );
            println!("Joined {zone} zone as {account} on {contract}");
        }
        Command::ListPlayers => list_players(app).await?,
        Command::Status => {
            app.refresh_all().await.context("failed to read contract state")?;
            let account = app.account().unwrap_or_else(Address::zero);
            match app.player().filter(|player| player.exists) {
                Some(player) => {
                    println!("{account}: {}", zone_label(player.zone));
                    println!(" handle: {}", player.health);
                    println!(" publicly decryptable: {}", player.publicly_decryptable);
                }
                None => println!("{account}: {}", zone_label(Zone::None)),
            }
        }
    }
    Ok(())
}

async fn list_players(app: &ShadowApp) -> Result<()> {
    app.refresh_all().await.context("failed to read rosters")?;
    app.settle_reveals().await;
    let me = app.account();
    let can_decrypt = app.decrypt_client().is_some();

    println!("Shadow zone players:");
    let shadow = app.queries().shadow_roster().data.unwrap_or_default();
    for (address, handle) in shadow.entries() {
        let mut line = format!(" - {address} (handle: {handle})");
        if can_decrypt && me == Some(address) {
            match app.decrypt(ZoneKind::Shadow, address, handle).await {
                Ok(Some(value)) => line.push_str(&format!(" | decrypted={value}")),
                Ok(None) => {}
                Err(err) => warn!(target = LOG_TARGET, error = %err, "user decryption failed"),
            }
        }
        println!("{line}");
    }

    println!("Public zone players:");
    let public = app.queries().public_roster().data.unwrap_or_default();
    let state = app.state();
    for (address, handle) in public.entries() {
        let mut line = format!(" - {address} (handle: {handle})");
        if let Some(value) = state.decrypted_value(&handle) {
            line.push_str(&format!(" | public={value}"));
        } else if can_decrypt && me == Some(address) {
            if let Ok(Some(value)) = app.decrypt(ZoneKind::Shadow, address, handle).await {
                line.push_str(&format!(" | decrypted={value}"));
            }
        }
        println!("{line}");
    }
    Ok(())
}
