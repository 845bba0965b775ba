//! Background reveal of public-zone health values.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::relayer::DecryptClient;
use crate::state::{AppAction, AppStore};
use crate::tokio_tools::spawn_named_task;
use crate::types::{Handle, ZoneRoster};

const LOG_TARGET: &str = "reconcile";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied(usize),
    /// A newer run or a cache reset superseded this one.
    Discarded,
    Failed,
}

pub struct PublicRevealReconciler {
    store: AppStore,
    current: Mutex<Option<CancellationToken>>,
}

impl PublicRevealReconciler {
    pub fn new(store: AppStore) -> Self {
        Self {
            store,
            current: Mutex::new(None),
        }
    }

    /// Public handles of `roster` that have no cached plaintext yet.
    pub fn missing(&self, roster: &ZoneRoster) -> Vec<Handle> {
        let state = self.store.snapshot();
        let mut seen = BTreeSet::new();
        roster
            .handles()
            .iter()
            .copied()
            .filter(|handle| !handle.is_zero() && !state.decrypted.contains_key(handle))
            .filter(|handle| seen.insert(*handle))
            .collect()
    }

    /// Cancels the previous run and starts a new one covering `roster`.
    ///
    /// Returns `None` when every public value is already known.
    pub fn schedule(
        &self,
        client: Arc<dyn DecryptClient>,
        roster: &ZoneRoster,
    ) -> Option<JoinHandle<ReconcileOutcome>> {
        let token = CancellationToken::new();
        if let Some(previous) = self.current.lock().replace(token.clone()) {
            previous.cancel();
        }

        let handles = self.missing(roster);
        if handles.is_empty() {
            return None;
        }
        debug!(target = LOG_TARGET, count = handles.len(), "scheduling public reveal");
        let store = self.store.clone();
        match spawn_named_task("reconcile_public_reveals", reveal(client, store, handles, token))
        {
            Ok(handle) => Some(handle),
            Err(err) => {
                error!(target = LOG_TARGET, error = %err, "failed to spawn public reveal");
                None
            }
        }
    }

    pub fn cancel(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
    }
}

impl Drop for PublicRevealReconciler {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn reveal(
    client: Arc<dyn DecryptClient>,
    store: AppStore,
    handles: Vec<Handle>,
    token: CancellationToken,
) -> ReconcileOutcome {
    let result = tokio::select! {
        _ = token.cancelled() => {
            debug!(target = LOG_TARGET, "reveal cancelled while in flight");
            return ReconcileOutcome::Discarded;
        }
        result = client.public_decrypt(&handles) => result,
    };

    let values = match result {
        Ok(values) => values,
        Err(err) => {
            error!(
                target = LOG_TARGET,
                error = %err,
                count = handles.len(),
                "failed to reveal public health values"
            );
            return ReconcileOutcome::Failed;
        }
    };

    let revealed: Vec<(Handle, String)> = handles
        .iter()
        .filter_map(|handle| values.get(handle).map(|value| (*handle, value.clone())))
        .collect();
    let count = revealed.len();
    // The cancellation check runs under the store lock, so a reset that
    // cancels first can never be overwritten by this run.
    let applied = store.dispatch_if(|_| !token.is_cancelled(), AppAction::Revealed(revealed));
    if !applied {
        debug!(target = LOG_TARGET, "dropping stale reveal result");
        return ReconcileOutcome::Discarded;
    }
    info!(target = LOG_TARGET, count, "revealed public health values");
    ReconcileOutcome::Applied(count)
}
