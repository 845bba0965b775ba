//! View models for the zone dashboard and their console rendering.

use std::fmt;

use crate::app::ShadowApp;
use crate::query::QuerySnapshot;
use crate::state::{AppState, Banner, BannerKind};
use crate::types::{Address, Handle, PlayerSnapshot, Zone, ZoneKind, ZoneRoster};

pub fn zone_label(zone: Zone) -> &'static str {
    match zone {
        Zone::None => "Not joined",
        Zone::Shadow => "Shadow zone",
        Zone::Public => "Public zone",
    }
}

/// `0x1234...abcd`
pub fn shorten_address(address: &Address) -> String {
    let text = address.to_string();
    format!("{}...{}", &text[..6], &text[text.len() - 4..])
}

/// `0x12345678...abcdef`
pub fn format_handle(handle: &Handle) -> String {
    let text = handle.to_string();
    format!("{}...{}", &text[..10], &text[text.len() - 6..])
}

pub fn join_button_label(zone: ZoneKind, joining: Option<ZoneKind>) -> &'static str {
    match (zone, joining == Some(zone)) {
        (ZoneKind::Shadow, true) => "Joining shadow...",
        (ZoneKind::Shadow, false) => "Join Shadow Zone",
        (ZoneKind::Public, true) => "Joining public...",
        (ZoneKind::Public, false) => "Join Public Zone",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowAction {
    pub label: &'static str,
    pub disabled: bool,
    pub zone: ZoneKind,
    pub owner: Address,
    pub handle: Handle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRow {
    pub address: Address,
    pub handle: Handle,
    pub is_self: bool,
    pub decrypted: Option<String>,
    pub action: Option<RowAction>,
}

impl ZoneRow {
    pub fn status_text(&self) -> String {
        match &self.decrypted {
            Some(value) => value.clone(),
            None => format_handle(&self.handle),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionBody {
    Loading,
    Empty,
    Rows(Vec<ZoneRow>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneSectionView {
    pub zone: ZoneKind,
    pub title: &'static str,
    pub description: &'static str,
    pub player_count: usize,
    pub body: SectionBody,
}

/// Builds one roster section. Shadow rows offer decryption only to their
/// owner; public rows offer it to everyone until revealed.
pub fn zone_section(
    zone: ZoneKind,
    roster: &QuerySnapshot<ZoneRoster>,
    account: Option<Address>,
    state: &AppState,
) -> ZoneSectionView {
    let (title, description) = match zone {
        ZoneKind::Shadow => (
            "Shadow zone",
            "Only the owner can decrypt their health. Others see the encrypted handle.",
        ),
        ZoneKind::Public => (
            "Public zone",
            "Health values are publicly decryptable. Anyone can reveal them using the relayer.",
        ),
    };
    let data = roster.data.clone().unwrap_or_default();
    let body = if roster.is_loading() {
        SectionBody::Loading
    } else if data.is_empty() {
        SectionBody::Empty
    } else {
        SectionBody::Rows(
            data.entries()
                .map(|(address, handle)| zone_row(zone, address, handle, account, state))
                .collect(),
        )
    };
    ZoneSectionView {
        zone,
        title,
        description,
        player_count: data.len(),
        body,
    }
}

fn zone_row(
    zone: ZoneKind,
    address: Address,
    handle: Handle,
    account: Option<Address>,
    state: &AppState,
) -> ZoneRow {
    let decrypted = state.decrypted_value(&handle).map(str::to_owned);
    let is_self = account == Some(address);
    let show_action = match zone {
        ZoneKind::Shadow => is_self && decrypted.is_none(),
        ZoneKind::Public => decrypted.is_none(),
    };
    let pending = state.is_pending(&handle);
    let action = show_action.then(|| RowAction {
        label: match (pending, zone) {
            (true, _) => "Decrypting...",
            (false, ZoneKind::Public) => "Reveal status",
            (false, ZoneKind::Shadow) => "Decrypt mine",
        },
        disabled: pending,
        zone,
        owner: address,
        handle,
    });
    ZoneRow {
        address,
        handle,
        is_self,
        decrypted,
        action,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonalAction {
    pub label: &'static str,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonalStatusView {
    Disconnected,
    Loading,
    NotJoined,
    Joined {
        zone: Zone,
        handle: Option<Handle>,
        decrypted: Option<String>,
        action: Option<PersonalAction>,
    },
}

pub fn personal_status(
    account: Option<Address>,
    player: &QuerySnapshot<PlayerSnapshot>,
    state: &AppState,
    client_ready: bool,
) -> PersonalStatusView {
    if account.is_none() {
        return PersonalStatusView::Disconnected;
    }
    if player.is_loading() {
        return PersonalStatusView::Loading;
    }
    let Some(record) = player.data.filter(|record| record.exists) else {
        return PersonalStatusView::NotJoined;
    };
    let handle = record.health_handle();
    let decrypted = handle
        .and_then(|handle| state.decrypted_value(&handle))
        .map(str::to_owned);
    let can_decrypt = handle.is_some()
        && (record.zone == Zone::Public || (record.zone == Zone::Shadow && decrypted.is_none()));
    let action = can_decrypt.then(|| {
        let pending = handle.is_some_and(|handle| state.is_pending(&handle));
        PersonalAction {
            label: if pending {
                "Processing..."
            } else {
                "Decrypt my health"
            },
            disabled: !client_ready || pending,
        }
    });
    PersonalStatusView::Joined {
        zone: record.zone,
        handle,
        decrypted,
        action,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppView {
    pub banner: Option<Banner>,
    pub join_shadow: &'static str,
    pub join_public: &'static str,
    pub join_disabled: bool,
    pub personal: PersonalStatusView,
    pub shadow: ZoneSectionView,
    pub public: ZoneSectionView,
}

impl ShadowApp {
    pub fn view(&self) -> AppView {
        let state = self.state();
        let account = self.account();
        AppView {
            banner: state.banner.clone(),
            join_shadow: join_button_label(ZoneKind::Shadow, state.joining_zone),
            join_public: join_button_label(ZoneKind::Public, state.joining_zone),
            join_disabled: state.is_joining(),
            personal: personal_status(
                account,
                &self.queries().player(account),
                &state,
                self.decrypt_client().is_some(),
            ),
            shadow: zone_section(ZoneKind::Shadow, &self.queries().shadow_roster(), account, &state),
            public: zone_section(ZoneKind::Public, &self.queries().public_roster(), account, &state),
        }
    }
}

impl fmt::Display for ZoneSectionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} players)", self.title, self.player_count)?;
        writeln!(f, "  {}", self.description)?;
        match &self.body {
            SectionBody::Loading => writeln!(f, "  Loading players..."),
            SectionBody::Empty => writeln!(f, "  No players joined yet."),
            SectionBody::Rows(rows) => {
                for row in rows {
                    write!(
                        f,
                        "  - {}{} | {}",
                        shorten_address(&row.address),
                        if row.is_self { " (you)" } else { "" },
                        row.status_text()
                    )?;
                    if let Some(action) = &row.action {
                        write!(f, " [{}]", action.label)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for PersonalStatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Your status")?;
        match self {
            PersonalStatusView::Disconnected => {
                writeln!(f, "  Connect your wallet to view your status.")
            }
            PersonalStatusView::Loading => writeln!(f, "  Fetching your latest status..."),
            PersonalStatusView::NotJoined => writeln!(
                f,
                "  You have not joined the game yet. Pick a zone above to receive your encrypted health."
            ),
            PersonalStatusView::Joined {
                zone,
                handle,
                decrypted,
                action,
            } => {
                writeln!(f, "  Current zone: {}", zone_label(*zone))?;
                match handle {
                    Some(handle) => writeln!(f, "  Health handle: {}", format_handle(handle))?,
                    None => writeln!(f, "  Health handle: Not available")?,
                }
                writeln!(
                    f,
                    "  Decrypted health: {}",
                    decrypted.as_deref().unwrap_or("Encrypted")
                )?;
                if let Some(action) = action {
                    writeln!(f, "  [{}]", action.label)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for AppView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(banner) = &self.banner {
            let tag = match banner.kind {
                BannerKind::Info => "info",
                BannerKind::Error => "error",
                BannerKind::Success => "success",
            };
            writeln!(f, "[{tag}] {}", banner.message)?;
        }
        writeln!(f, "[{}] [{}]", self.join_shadow, self.join_public)?;
        write!(f, "{}", self.personal)?;
        write!(f, "{}", self.shadow)?;
        write!(f, "{}", self.public)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryStatus;
    use crate::state::AppAction;

    fn address(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn handle(byte: u8) -> Handle {
        Handle::new([byte; 32])
    }

    fn loaded<T>(data: T) -> QuerySnapshot<T> {
        QuerySnapshot {
            status: QueryStatus::Success,
            data: Some(data),
            is_fetching: false,
        }
    }

    fn roster() -> ZoneRoster {
        ZoneRoster::new(vec![address(1), address(2)], vec![handle(1), handle(2)]).unwrap()
    }

    #[test]
    fn shortens_like_the_dashboard() {
        assert_eq!(shorten_address(&address(0xab)), "0xabab...abab");
        let handle = Handle::new([
            0x01, 0x23, 0x45, 0x67, 0x89, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0, 0, 0, 0, 0, 0xaa, 0xbb, 0xcc,
        ]);
        assert_eq!(format_handle(&handle), "0x01234567...aabbcc");
    }

    #[test]
    fn shadow_rows_offer_decrypt_to_owner_only() {
        let section = zone_section(
            ZoneKind::Shadow,
            &loaded(roster()),
            Some(address(2)),
            &AppState::default(),
        );
        let SectionBody::Rows(rows) = section.body else {
            panic!("expected rows");
        };
        assert!(rows[0].action.is_none());
        let action = rows[1].action.as_ref().unwrap();
        assert_eq!(action.label, "Decrypt mine");
        assert_eq!(action.owner, address(2));
    }

    #[test]
    fn public_rows_hide_action_once_revealed() {
        let state = AppState::default()
            .reduce(AppAction::Revealed(vec![(handle(1), "6".into())]))
            .reduce(AppAction::DecryptStarted(handle(2)));
        let section = zone_section(ZoneKind::Public, &loaded(roster()), None, &state);
        let SectionBody::Rows(rows) = section.body else {
            panic!("expected rows");
        };
        assert!(rows[0].action.is_none());
        assert_eq!(rows[0].status_text(), "6");
        let pending = rows[1].action.as_ref().unwrap();
        assert_eq!(pending.label, "Decrypting...");
        assert!(pending.disabled);
    }

    #[test]
    fn loading_and_empty_sections() {
        let loading = QuerySnapshot {
            status: QueryStatus::Loading,
            data: None,
            is_fetching: true,
        };
        let state = AppState::default();
        assert_eq!(
            zone_section(ZoneKind::Public, &loading, None, &state).body,
            SectionBody::Loading
        );
        assert_eq!(
            zone_section(ZoneKind::Public, &loaded(ZoneRoster::empty()), None, &state).body,
            SectionBody::Empty
        );
    }

    #[test]
    fn personal_action_follows_zone() {
        let shadow = PlayerSnapshot {
            exists: true,
            zone: Zone::Shadow,
            health: handle(9),
            publicly_decryptable: false,
        };
        let decrypted = AppState::default().reduce(AppAction::Revealed(vec![(handle(9), "3".into())]));

        let view = personal_status(Some(address(1)), &loaded(shadow), &decrypted, true);
        assert!(matches!(view, PersonalStatusView::Joined { action: None, .. }));

        let public = PlayerSnapshot {
            zone: Zone::Public,
            publicly_decryptable: true,
            ..shadow
        };
        let view = personal_status(Some(address(1)), &loaded(public), &decrypted, false);
        let PersonalStatusView::Joined { action: Some(action), .. } = view else {
            panic!("public players can always re-run decryption");
        };
        assert!(action.disabled);

        assert_eq!(
            personal_status(None, &loaded(shadow), &decrypted, true),
            PersonalStatusView::Disconnected
        );
        assert_eq!(
            personal_status(
                Some(address(1)),
                &loaded(PlayerSnapshot::absent()),
                &decrypted,
                true
            ),
            PersonalStatusView::NotJoined
        );
    }

    #[test]
    fn join_labels_track_marker() {
        assert_eq!(join_button_label(ZoneKind::Shadow, None), "Join Shadow Zone");
        assert_eq!(
            join_button_label(ZoneKind::Public, Some(ZoneKind::Public)),
            "Joining public..."
        );
        assert_eq!(
            join_button_label(ZoneKind::Shadow, Some(ZoneKind::Public)),
            "Join Shadow Zone"
        );
    }
}
