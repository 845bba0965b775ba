use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::*;
use crate::chain::ChainError;
use crate::devnet::DevNetwork;
use crate::error::ConnectionGap;
use crate::reconcile::ReconcileOutcome;
use crate::state::BannerKind;
use crate::test_utils::DevFixture;
use crate::types::Zone;

fn banner(app: &ShadowApp) -> (BannerKind, String) {
    let banner = app.state().banner.expect("a banner should be showing");
    (banner.kind, banner.message)
}

fn health(value: &str) -> u32 {
    let health: u32 = value.parse().expect("health decrypts to an integer");
    assert!((1..=10).contains(&health), "health {health} out of range");
    health
}

#[tokio::test]
async fn shadow_join_yields_private_health() {
    let fixture = DevFixture::new();
    let (app, _relayer) = fixture.app_for(fixture.alice());

    let outcome = app.join_zone(ZoneKind::Shadow).await.unwrap();
    assert_eq!(outcome.zone, ZoneKind::Shadow);
    assert_eq!(
        banner(&app),
        (
            BannerKind::Success,
            "Joined the shadow zone with a fresh encrypted health!".to_string()
        )
    );
    assert!(app.state().joining_zone.is_none());

    let player = app.player().expect("player refetched after join");
    assert!(player.exists);
    assert_eq!(player.zone, Zone::Shadow);
    assert!(!player.publicly_decryptable);
    assert!(!player.health.is_zero());

    let shadow = app.queries().shadow_roster().data.unwrap();
    let public = app.queries().public_roster().data.unwrap();
    assert_eq!(shadow.addresses(), &[fixture.alice()]);
    assert!(!public.contains(&fixture.alice()));

    let value = app.decrypt_personal().await.unwrap().expect("owner can decrypt");
    health(&value);
    assert_eq!(app.state().decrypted_value(&player.health), Some(value.as_str()));
    assert!(app.state().pending.is_empty());
}

#[tokio::test]
async fn public_health_is_revealed_for_any_viewer() {
    let fixture = DevFixture::new();
    let (bob_app, _) = fixture.app_for(fixture.bob());
    bob_app.join_zone(ZoneKind::Public).await.unwrap();
    assert_eq!(
        banner(&bob_app).1,
        "Joined the public zone successfully."
    );
    let bob = fixture.player(fixture.bob()).await;
    assert_eq!(bob.zone, Zone::Public);
    assert!(bob.publicly_decryptable);

    let (alice_app, _) = fixture.app_for(fixture.alice());
    alice_app.refresh_all().await.unwrap();
    let roster = alice_app.queries().public_roster().data.unwrap();
    assert_eq!(roster.handle_of(&fixture.bob()), Some(bob.health));

    assert_eq!(
        alice_app.settle_reveals().await,
        Some(ReconcileOutcome::Applied(1))
    );
    let revealed = alice_app
        .state()
        .decrypted_value(&bob.health)
        .map(str::to_owned)
        .expect("reconciliation revealed bob");
    health(&revealed);

    let again = alice_app
        .decrypt(ZoneKind::Public, fixture.bob(), bob.health)
        .await
        .unwrap();
    assert_eq!(again.as_deref(), Some(revealed.as_str()));
}

#[tokio::test]
async fn switching_zones_reissues_handle() {
    let fixture = DevFixture::new();
    let (app, _) = fixture.app_for(fixture.alice());

    app.join_zone(ZoneKind::Shadow).await.unwrap();
    let shadow_handle = app.player().unwrap().health;
    let private = app.decrypt_personal().await.unwrap();
    assert!(private.is_some());

    let outcome = app.join_zone(ZoneKind::Public).await.unwrap();
    assert_eq!(
        outcome.events,
        vec![crate::abi::ShadowEvent::PlayerZoneUpdated {
            player: fixture.alice(),
            previous_zone: Zone::Shadow,
            new_zone: Zone::Public,
        }]
    );
    let state = app.state();
    assert!(state.decrypted_value(&shadow_handle).is_none());

    let player = app.player().unwrap();
    assert_eq!(player.zone, Zone::Public);
    assert!(player.publicly_decryptable);
    assert_ne!(player.health, shadow_handle);

    let shadow = app.queries().shadow_roster().data.unwrap();
    let public = app.queries().public_roster().data.unwrap();
    assert!(!shadow.contains(&fixture.alice()));
    assert_eq!(public.handle_of(&fixture.alice()), Some(player.health));
}

#[tokio::test]
async fn rejoining_same_zone_fails_without_side_effects() {
    let fixture = DevFixture::new();
    let (app, _) = fixture.app_for(fixture.alice());
    app.join_zone(ZoneKind::Shadow).await.unwrap();
    let before = fixture.player(fixture.alice()).await;
    let block = fixture.network.block_number();

    let err = app.join_zone(ZoneKind::Shadow).await.unwrap_err();
    assert!(matches!(err, ProtocolError::TransactionFailed(_)));
    assert_eq!(
        banner(&app),
        (
            BannerKind::Error,
            "Failed to join zone: execution reverted: AlreadyInZone(Shadow)".to_string()
        )
    );
    assert!(app.state().joining_zone.is_none());
    assert_eq!(fixture.player(fixture.alice()).await, before);
    assert_eq!(fixture.network.block_number(), block);
}

#[tokio::test]
async fn join_requires_wallet_and_signer() {
    let fixture = DevFixture::new();
    let app = fixture.app();

    let err = app.join_zone(ZoneKind::Public).await.unwrap_err();
    assert_eq!(err, ProtocolError::NotConnected(ConnectionGap::NoWallet));
    assert_eq!(
        banner(&app).1,
        "Connect your wallet before joining a zone."
    );

    app.connect(WalletSession::read_only(fixture.alice()));
    let err = app.join_zone(ZoneKind::Public).await.unwrap_err();
    assert_eq!(err, ProtocolError::NotConnected(ConnectionGap::NoSigner));
    assert_eq!(banner(&app).1, "Unable to access signer from wallet.");

    app.dismiss_banner();
    assert!(app.state().banner.is_none());
    app.disconnect();
    assert_eq!(app.account(), None);
    let err = app.join_zone(ZoneKind::Public).await.unwrap_err();
    assert_eq!(err, ProtocolError::NotConnected(ConnectionGap::NoWallet));
    assert_eq!(fixture.network.block_number(), 0);
}

#[tokio::test]
async fn shadow_decrypt_is_owner_only() {
    let fixture = DevFixture::new();
    let alice = fixture.join(fixture.alice(), ZoneKind::Shadow).await;
    assert_eq!(alice.events.len(), 1);
    let handle = fixture.player(fixture.alice()).await.health;

    let (bob_app, _) = fixture.app_for(fixture.bob());
    let err = bob_app
        .decrypt(ZoneKind::Shadow, fixture.alice(), handle)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProtocolError::Unauthorized {
            caller: Some(fixture.bob()),
            owner: fixture.alice(),
        }
    );
    assert_eq!(
        banner(&bob_app).1,
        "Only the player can decrypt their shadow health."
    );
    assert!(bob_app.state().pending.is_empty());
    assert!(bob_app.state().decrypted.is_empty());
}

#[tokio::test]
async fn shadow_decrypt_needs_a_signer() {
    let fixture = DevFixture::new();
    fixture.join(fixture.alice(), ZoneKind::Shadow).await;
    let handle = fixture.player(fixture.alice()).await.health;

    let app = fixture.app();
    app.connect(WalletSession::read_only(fixture.alice()));
    app.set_decrypt_client(Some(Arc::new(fixture.relayer())));
    let err = app
        .decrypt(ZoneKind::Shadow, fixture.alice(), handle)
        .await
        .unwrap_err();
    assert_eq!(err, ProtocolError::SignerUnavailable);
    assert_eq!(banner(&app).1, "Signer unavailable for decryption request.");
}

#[tokio::test]
async fn decrypt_requires_ready_client() {
    let fixture = DevFixture::new();
    fixture.join(fixture.bob(), ZoneKind::Public).await;
    let handle = fixture.player(fixture.bob()).await.health;

    let app = fixture.app();
    let err = app
        .decrypt(ZoneKind::Public, fixture.bob(), handle)
        .await
        .unwrap_err();
    assert_eq!(err, ProtocolError::ServiceNotReady);
    assert_eq!(banner(&app).1, "Encryption service is not ready yet.");
    assert!(app.state().pending.is_empty());
}

#[tokio::test]
async fn relayer_failure_clears_pending_marker() {
    let fixture = DevFixture::new();
    fixture.join(fixture.bob(), ZoneKind::Public).await;
    let handle = fixture.player(fixture.bob()).await.health;
    let (app, relayer) = fixture.app_for(fixture.alice());
    relayer.set_public_outage(true);

    let err = app
        .decrypt(ZoneKind::Public, fixture.bob(), handle)
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::DecryptionFailed(_)));
    assert_eq!(
        banner(&app).1,
        "Decryption failed: relayer unavailable: public decryption offline"
    );
    assert!(!app.state().is_pending(&handle));
}

#[tokio::test]
async fn concurrent_decrypts_of_one_handle_issue_one_request() {
    let fixture = DevFixture::new();
    fixture.join(fixture.bob(), ZoneKind::Public).await;
    let handle = fixture.player(fixture.bob()).await.health;
    let gate = Arc::new(Semaphore::new(0));
    let relayer = fixture.relayer().with_gate(gate.clone());
    let app = fixture.app_with(fixture.alice(), &relayer);

    let release = async {
        tokio::task::yield_now().await;
        assert!(app.state().is_pending(&handle));
        gate.add_permits(1);
    };
    let (first, second, ()) = tokio::join!(
        app.decrypt(ZoneKind::Public, fixture.bob(), handle),
        app.decrypt(ZoneKind::Public, fixture.bob(), handle),
        release,
    );

    assert!(first.unwrap().is_some());
    assert_eq!(second.unwrap(), None);
    assert_eq!(relayer.public_batches().len(), 1);
    assert!(app.state().pending.is_empty());
}

#[tokio::test]
async fn reconciliation_batches_public_handles() {
    let fixture = DevFixture::new();
    fixture.join(fixture.bob(), ZoneKind::Public).await;
    fixture.join(fixture.carol(), ZoneKind::Public).await;
    fixture.join(fixture.alice(), ZoneKind::Shadow).await;
    let (app, relayer) = fixture.app_for(fixture.alice());

    app.refresh_all().await.unwrap();
    assert_eq!(app.settle_reveals().await, Some(ReconcileOutcome::Applied(2)));

    let batches = relayer.public_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
    let shadow_handle = fixture.player(fixture.alice()).await.health;
    assert!(app.state().decrypted_value(&shadow_handle).is_none());

    // Nothing left to reveal on the next refresh.
    app.refresh_all().await.unwrap();
    assert_eq!(app.settle_reveals().await, None);
    assert_eq!(relayer.public_batches().len(), 1);
}

#[tokio::test]
async fn client_becoming_ready_reveals_cached_roster() {
    let fixture = DevFixture::new();
    fixture.join(fixture.bob(), ZoneKind::Public).await;
    let app = fixture.app();
    app.refresh_all().await.unwrap();
    assert!(app.state().decrypted.is_empty());

    app.set_decrypt_client(Some(Arc::new(fixture.relayer())));
    assert_eq!(app.settle_reveals().await, Some(ReconcileOutcome::Applied(1)));
    assert_eq!(app.state().decrypted.len(), 1);
}

#[tokio::test]
async fn cache_reset_discards_in_flight_reveal() {
    let fixture = DevFixture::new();
    fixture.join(fixture.bob(), ZoneKind::Public).await;
    let gate = Arc::new(Semaphore::new(0));
    let relayer = fixture.relayer().with_gate(gate.clone());
    let app = fixture.app_with(fixture.alice(), &relayer);

    app.refresh_all().await.unwrap();
    tokio::task::yield_now().await;
    app.reset_decryptions();
    gate.add_permits(1);

    assert_eq!(app.settle_reveals().await, Some(ReconcileOutcome::Discarded));
    assert!(app.state().decrypted.is_empty());
}

#[tokio::test]
async fn second_join_while_pending_is_rejected() {
    let fixture = DevFixture::new();
    let (app, _) = fixture.app_for(fixture.alice());
    app.store.dispatch(crate::state::AppAction::JoinStarted(ZoneKind::Public));

    let err = app.join_zone(ZoneKind::Shadow).await.unwrap_err();
    assert_eq!(err, ProtocolError::JoinInProgress);
    assert_eq!(fixture.network.block_number(), 0);
}

#[tokio::test]
async fn view_reflects_roster_and_reveals() {
    let fixture = DevFixture::new();
    fixture.join(fixture.bob(), ZoneKind::Public).await;
    let (app, _) = fixture.app_for(fixture.alice());
    app.join_zone(ZoneKind::Shadow).await.unwrap();
    app.settle_reveals().await;

    let view = app.view();
    assert_eq!(view.shadow.player_count, 1);
    assert_eq!(view.public.player_count, 1);
    let rendered = view.to_string();
    assert!(rendered.contains("[success] Joined the shadow zone with a fresh encrypted health!"));
    assert!(rendered.contains("Current zone: Shadow zone"));
    assert!(rendered.contains("[Decrypt mine]"));
    assert!(!rendered.contains("[Reveal status]"));
}

/// Reads the dev network immediately but, while armed, holds the reply of
/// the next call until a permit is released.
struct HeldReader {
    network: DevNetwork,
    armed: AtomicBool,
    release: Arc<Semaphore>,
}

#[async_trait]
impl ChainReader for HeldReader {
    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let reply = self.network.call(to, data).await;
        if self.armed.swap(false, Ordering::SeqCst) {
            let permit = self
                .release
                .acquire()
                .await
                .map_err(|_| ChainError::Transport("reader closed".into()))?;
            permit.forget();
        }
        reply
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.network.chain_id().await
    }
}

#[tokio::test]
async fn join_ignores_player_read_started_before_confirmation() {
    let fixture = DevFixture::new();
    let release = Arc::new(Semaphore::new(0));
    let reader = Arc::new(HeldReader {
        network: fixture.network.clone(),
        armed: AtomicBool::new(true),
        release: release.clone(),
    });
    let app = ShadowApp::new(fixture.network.client_config(), reader);
    app.connect(WalletSession::with_signer(fixture.signer(fixture.alice())));

    let early_read = app.refetch_player();
    tokio::pin!(early_read);
    assert!(futures::poll!(&mut early_read).is_pending());

    tokio::time::timeout(Duration::from_secs(5), app.join_zone(ZoneKind::Shadow))
        .await
        .expect("join must not wait on the earlier read")
        .unwrap();
    let player = app.player().expect("player refetched after join");
    assert!(player.exists);
    assert_eq!(player.zone, Zone::Shadow);

    release.add_permits(1);
    let early = early_read.await.unwrap().expect("account is connected");
    assert_eq!(early.zone, Zone::None);
    assert_eq!(app.player().map(|player| player.zone), Some(Zone::Shadow));
}

#[tokio::test]
async fn public_roster_refetch_reveals_new_handles() {
    let fixture = DevFixture::new();
    let (app, relayer) = fixture.app_for(fixture.alice());
    fixture.join(fixture.bob(), ZoneKind::Public).await;
    fixture.join(fixture.carol(), ZoneKind::Public).await;

    let roster = app
        .refetch_roster(ZoneKind::Public)
        .await
        .unwrap()
        .expect("contract is connected");
    assert_eq!(roster.len(), 2);
    assert_eq!(app.settle_reveals().await, Some(ReconcileOutcome::Applied(2)));
    for handle in roster.handles() {
        health(app.state().decrypted_value(handle).expect("public value revealed"));
    }
    assert_eq!(relayer.public_batches().len(), 1);

    app.refetch_roster(ZoneKind::Shadow).await.unwrap();
    assert_eq!(app.settle_reveals().await, None);
}

#[tokio::test]
async fn own_join_clears_revealed_values_of_other_players() {
    let fixture = DevFixture::new();
    fixture.join(fixture.bob(), ZoneKind::Public).await;
    let bob = fixture.player(fixture.bob()).await;
    let gate = Arc::new(Semaphore::new(1));
    let relayer = fixture.relayer().with_gate(gate.clone());
    let app = fixture.app_with(fixture.alice(), &relayer);

    app.refresh_all().await.unwrap();
    assert_eq!(app.settle_reveals().await, Some(ReconcileOutcome::Applied(1)));
    let revealed = app
        .state()
        .decrypted_value(&bob.health)
        .map(str::to_owned)
        .expect("bob's health revealed");

    app.join_zone(ZoneKind::Shadow).await.unwrap();
    assert_eq!(app.state().decrypted_value(&bob.health), None);
    assert!(app.state().decrypted.is_empty());

    gate.add_permits(1);
    assert_eq!(app.settle_reveals().await, Some(ReconcileOutcome::Applied(1)));
    assert_eq!(
        app.state().decrypted_value(&bob.health),
        Some(revealed.as_str())
    );
}
