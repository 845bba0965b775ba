//! Cached contract reads.
//!
//! Each entry keeps its last good value while a refresh is in flight and after
//! a failed one. Concurrent fetches of one key share a single request.

use std::future::Future;
use std::hash::Hash;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use crate::chain::{ContractError, ShadowContract};
use crate::types::{Address, PlayerSnapshot, ZoneKind, ZoneRoster};

const LOG_TARGET: &str = "query";

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, ContractError>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    /// Inputs are missing; nothing will be fetched.
    Disabled,
    Idle,
    Loading,
    Success,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySnapshot<T> {
    pub status: QueryStatus,
    pub data: Option<T>,
    pub is_fetching: bool,
}

impl<T> QuerySnapshot<T> {
    pub fn disabled() -> Self {
        Self {
            status: QueryStatus::Disabled,
            data: None,
            is_fetching: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            QueryStatus::Error(message) => Some(message),
            _ => None,
        }
    }
}

struct Slot<T: Clone> {
    data: Option<T>,
    error: Option<String>,
    in_flight: Option<SharedFetch<T>>,
}

impl<T: Clone> Default for Slot<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            in_flight: None,
        }
    }
}

pub struct QueryCache<K, T: Clone> {
    slots: DashMap<K, Slot<T>>,
}

impl<K, T> QueryCache<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    pub fn snapshot(&self, key: &K) -> QuerySnapshot<T> {
        let Some(slot) = self.slots.get(key) else {
            return QuerySnapshot {
                status: QueryStatus::Idle,
                data: None,
                is_fetching: false,
            };
        };
        let is_fetching = slot.in_flight.is_some();
        let status = match (&slot.error, &slot.data) {
            (Some(message), _) => QueryStatus::Error(message.clone()),
            (None, Some(_)) => QueryStatus::Success,
            (None, None) if is_fetching => QueryStatus::Loading,
            (None, None) => QueryStatus::Idle,
        };
        QuerySnapshot {
            status,
            data: slot.data.clone(),
            is_fetching,
        }
    }

    /// Fetches `key`, joining a request already in flight for it.
    ///
    /// The result is stored only if the entry was not invalidated meanwhile.
    pub async fn fetch_with<F, Fut>(&self, key: K, fetch: F) -> Result<T, ContractError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ContractError>> + Send + 'static,
    {
        let shared = {
            let mut slot = self.slots.entry(key.clone()).or_default();
            match &slot.in_flight {
                Some(in_flight) => {
                    debug!(target = LOG_TARGET, ?key, "joining in-flight fetch");
                    in_flight.clone()
                }
                None => {
                    let fresh = fetch().boxed().shared();
                    slot.in_flight = Some(fresh.clone());
                    fresh
                }
            }
        };

        let result = shared.clone().await;

        if let Some(mut slot) = self.slots.get_mut(&key) {
            let current = slot
                .in_flight
                .as_ref()
                .is_some_and(|in_flight| in_flight.ptr_eq(&shared));
            if current {
                slot.in_flight = None;
                match &result {
                    Ok(value) => {
                        slot.data = Some(value.clone());
                        slot.error = None;
                    }
                    Err(err) => {
                        warn!(target = LOG_TARGET, ?key, error = %err, "fetch failed");
                        slot.error = Some(err.to_string());
                    }
                }
            }
        }
        result
    }

    /// Detaches any in-flight fetch of `key` so its result is never stored
    /// and the next fetch issues a fresh request. Cached data stays visible.
    pub fn invalidate(&self, key: &K) {
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.in_flight = None;
            slot.error = None;
        }
    }

    pub fn invalidate_all(&self) {
        for mut slot in self.slots.iter_mut() {
            slot.in_flight = None;
            slot.error = None;
        }
    }
}

impl<K, T> Default for QueryCache<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// The three contract reads the application renders from.
pub struct ZoneQueries {
    contract: Option<ShadowContract>,
    rosters: QueryCache<ZoneKind, ZoneRoster>,
    players: QueryCache<Address, PlayerSnapshot>,
}

impl ZoneQueries {
    pub fn new(contract: Option<ShadowContract>) -> Self {
        Self {
            contract,
            rosters: QueryCache::new(),
            players: QueryCache::new(),
        }
    }

    pub fn contract(&self) -> Option<&ShadowContract> {
        self.contract.as_ref()
    }

    pub fn roster(&self, zone: ZoneKind) -> QuerySnapshot<ZoneRoster> {
        if self.contract.is_none() {
            return QuerySnapshot::disabled();
        }
        self.rosters.snapshot(&zone)
    }

    pub fn shadow_roster(&self) -> QuerySnapshot<ZoneRoster> {
        self.roster(ZoneKind::Shadow)
    }

    pub fn public_roster(&self) -> QuerySnapshot<ZoneRoster> {
        self.roster(ZoneKind::Public)
    }

    pub fn player(&self, account: Option<Address>) -> QuerySnapshot<PlayerSnapshot> {
        match (&self.contract, account) {
            (Some(_), Some(account)) => self.players.snapshot(&account),
            _ => QuerySnapshot::disabled(),
        }
    }

    /// Forces a fresh roster read. `Ok(None)` when the query is disabled.
    pub(crate) async fn refetch_roster(
        &self,
        zone: ZoneKind,
    ) -> Result<Option<ZoneRoster>, ContractError> {
        let Some(contract) = self.contract.clone() else {
            return Ok(None);
        };
        self.rosters
            .fetch_with(zone, move || async move { contract.roster(zone).await })
            .await
            .map(Some)
    }

    pub(crate) async fn refetch_player(
        &self,
        account: Option<Address>,
    ) -> Result<Option<PlayerSnapshot>, ContractError> {
        let (Some(contract), Some(account)) = (self.contract.clone(), account) else {
            return Ok(None);
        };
        self.players
            .fetch_with(account, move || async move { contract.get_player(account).await })
            .await
            .map(Some)
    }

    /// Marks every roster and player entry stale. Reads already in flight
    /// finish for their callers but no longer land in the cache.
    pub fn invalidate_all(&self) {
        self.rosters.invalidate_all();
        self.players.invalidate_all();
    }
}
