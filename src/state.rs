//! Reducer-style application state.
//!
//! Every mutation is an [`AppAction`] applied through [`AppState::reduce`].
//! [`AppStore`] applies actions atomically inside a watch channel so readers
//! never observe a half-applied transition.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tokio::sync::watch;
use tracing::trace;

use crate::types::{Handle, ZoneKind};

const LOG_TARGET: &str = "state";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BannerKind {
    Info,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Banner {
    pub kind: BannerKind,
    pub message: String,
}

impl Banner {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Error,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Success,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppState {
    pub banner: Option<Banner>,
    pub joining_zone: Option<ZoneKind>,
    pub decrypted: BTreeMap<Handle, String>,
    pub pending: BTreeSet<Handle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    ShowBanner(Banner),
    DismissBanner,
    JoinStarted(ZoneKind),
    JoinSettled,
    /// Drops every decrypted value and pending marker.
    ClearDecryptions,
    DecryptStarted(Handle),
    /// Removes the pending marker, storing the value when one was resolved.
    DecryptSettled {
        handle: Handle,
        value: Option<String>,
    },
    Revealed(Vec<(Handle, String)>),
}

impl AppState {
    pub fn reduce(&self, action: AppAction) -> AppState {
        let mut next = self.clone();
        next.apply(action);
        next
    }

    fn apply(&mut self, action: AppAction) {
        match action {
            AppAction::ShowBanner(banner) => self.banner = Some(banner),
            AppAction::DismissBanner => self.banner = None,
            AppAction::JoinStarted(zone) => self.joining_zone = Some(zone),
            AppAction::JoinSettled => self.joining_zone = None,
            AppAction::ClearDecryptions => {
                self.decrypted.clear();
                self.pending.clear();
            }
            AppAction::DecryptStarted(handle) => {
                self.pending.insert(handle);
            }
            AppAction::DecryptSettled { handle, value } => {
                self.pending.remove(&handle);
                if let Some(value) = value {
                    self.decrypted.insert(handle, value);
                }
            }
            AppAction::Revealed(values) => self.decrypted.extend(values),
        }
    }

    pub fn decrypted_value(&self, handle: &Handle) -> Option<&str> {
        self.decrypted.get(handle).map(String::as_str)
    }

    pub fn is_pending(&self, handle: &Handle) -> bool {
        self.pending.contains(handle)
    }

    pub fn is_joining(&self) -> bool {
        self.joining_zone.is_some()
    }
}

/// Shared, observable [`AppState`].
#[derive(Clone)]
pub struct AppStore {
    tx: watch::Sender<AppState>,
}

impl AppStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AppState::default());
        Self { tx }
    }

    pub fn dispatch(&self, action: AppAction) {
        trace!(target = LOG_TARGET, ?action, "dispatch");
        self.tx.send_modify(|state| state.apply(action));
    }

    /// Applies `action` only if `guard` holds for the current state, in the
    /// same critical section. Returns whether it was applied.
    pub fn dispatch_if(&self, guard: impl FnOnce(&AppState) -> bool, action: AppAction) -> bool {
        self.tx.send_if_modified(|state| {
            if !guard(state) {
                return false;
            }
            state.apply(action);
            true
        })
    }

    pub fn snapshot(&self) -> AppState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.tx.subscribe()
    }
}

impl Default for AppStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(byte: u8) -> Handle {
        Handle::new([byte; 32])
    }

    #[test]
    fn decrypt_settle_clears_pending_and_keeps_value() {
        let state = AppState::default()
            .reduce(AppAction::DecryptStarted(handle(1)))
            .reduce(AppAction::DecryptStarted(handle(2)));
        assert!(state.is_pending(&handle(1)));

        let state = state
            .reduce(AppAction::DecryptSettled {
                handle: handle(1),
                value: Some("7".into()),
            })
            .reduce(AppAction::DecryptSettled {
                handle: handle(2),
                value: None,
            });
        assert!(state.pending.is_empty());
        assert_eq!(state.decrypted_value(&handle(1)), Some("7"));
        assert_eq!(state.decrypted_value(&handle(2)), None);
    }

    #[test]
    fn clear_drops_values_and_pending() {
        let state = AppState::default()
            .reduce(AppAction::Revealed(vec![(handle(3), "4".into())]))
            .reduce(AppAction::DecryptStarted(handle(5)))
            .reduce(AppAction::ClearDecryptions);
        assert!(state.decrypted.is_empty());
        assert!(state.pending.is_empty());
    }

    #[test]
    fn reduce_leaves_input_untouched() {
        let before = AppState::default();
        let after = before.reduce(AppAction::JoinStarted(ZoneKind::Public));
        assert!(!before.is_joining());
        assert_eq!(after.joining_zone, Some(ZoneKind::Public));
    }

    #[tokio::test]
    async fn subscribers_see_dispatched_actions() {
        let store = AppStore::new();
        let mut rx = store.subscribe();
        store.dispatch(AppAction::ShowBanner(Banner::success("done")));
        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow().banner.as_ref().map(|banner| banner.message.as_str()),
            Some("done")
        );
    }

    #[test]
    fn guarded_dispatch_applies_once() {
        let store = AppStore::new();
        let not_joining = |state: &AppState| !state.is_joining();
        assert!(store.dispatch_if(not_joining, AppAction::JoinStarted(ZoneKind::Shadow)));
        assert!(!store.dispatch_if(not_joining, AppAction::JoinStarted(ZoneKind::Public)));
        assert_eq!(store.snapshot().joining_zone, Some(ZoneKind::Shadow));
    }
}
