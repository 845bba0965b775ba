//! Walks two players through the zone flow on an in-process dev network.
//!
//! - Alice joins the shadow zone and decrypts her private health
//! - Bob joins the public zone; Alice's dashboard reveals his health
//! - Alice switches to the public zone and receives a fresh handle

mod common;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use shadow_protocol::devnet::{dev_account, DevNetwork};
use shadow_protocol::{ShadowApp, WalletSession, ZoneKind};

const LOG_TARGET: &str = "bin::shadow_demo";

#[derive(Debug, Parser)]
#[command(name = "shadow_demo")]
#[command(about = "Run the shadow/public zone walkthrough on a dev network", long_about = None)]
struct Args {
    /// Seed for the dev network's health sampling
    #[arg(long, env = "SHADOW_DEMO_SEED")]
    seed: Option<u64>,

    /// Toggle structured (JSON) logs
    #[arg(long, env = "SHADOW_LOG_JSON", default_value_t = false)]
    json: bool,
}

fn player_app(network: &DevNetwork, label: &str) -> ShadowApp {
    let app = ShadowApp::new(network.client_config(), Arc::new(network.clone()));
    app.connect(WalletSession::with_signer(Arc::new(
        network.signer(dev_account(label)),
    )));
    app.set_decrypt_client(Some(Arc::new(network.relayer())));
    app
}

fn show(title: &str, app: &ShadowApp) {
    println!("==== {title} ====");
    print!("{}", app.view());
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    common::load_dotenv();
    let args = Args::parse();
    common::init_tracing(args.json)?;

    let network = match args.seed {
        Some(seed) => DevNetwork::with_seed(seed),
        None => DevNetwork::new(),
    };
    info!(
        target = LOG_TARGET,
        contract = %network.contract_address(),
        "dev network ready"
    );

    let alice = player_app(&network, "alice");
    let bob = player_app(&network, "bob");

    alice
        .join_zone(ZoneKind::Shadow)
        .await
        .context("alice failed to join the shadow zone")?;
    let health = alice
        .decrypt_personal()
        .await
        .context("alice failed to decrypt her health")?;
    info!(target = LOG_TARGET, health = ?health, "alice decrypted her shadow health");
    show("Alice after joining the shadow zone", &alice);

    bob.join_zone(ZoneKind::Public)
        .await
        .context("bob failed to join the public zone")?;
    alice.refresh_all().await?;
    alice.settle_reveals().await;
    show("Alice sees Bob in the public zone", &alice);

    let own = bob.decrypt_personal().await?;
    info!(target = LOG_TARGET, health = ?own, "bob decrypted his public health");
    if let Some(handle) = alice.player().and_then(|player| player.health_handle()) {
        if let Err(err) = bob
            .decrypt(ZoneKind::Shadow, dev_account("alice"), handle)
            .await
        {
            info!(target = LOG_TARGET, error = %err, "bob cannot read alice's shadow health");
        }
    }
    show("Bob", &bob);

    alice
        .join_zone(ZoneKind::Public)
        .await
        .context("alice failed to switch zones")?;
    alice.settle_reveals().await;
    show("Alice after switching to the public zone", &alice);

    let rejoin = alice.join_zone(ZoneKind::Public).await;
    info!(
        target = LOG_TARGET,
        rejected = rejoin.is_err(),
        "alice tried to rejoin the public zone"
    );
    show("Alice after rejoining", &alice);
    Ok(())
}
