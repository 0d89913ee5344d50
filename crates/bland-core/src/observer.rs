//! Callback surface consumed by the presentation layer.
//!
//! Every method has an empty default so a frontend only overrides what it
//! renders. Callbacks run after the state change they report has been fully
//! applied; observers never see a half-updated [`SessionState`](crate::session::SessionState).

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::SessionError;
use crate::protocol::{GameOverInfo, GamePhase, PlayerView, ShowdownInfo, TurnOutcome};

/// Connection lifecycle as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    /// Open, and the session is in sync.
    Connected,
    /// Open again after a loss; waiting for the snapshot.
    Resyncing,
    /// Waiting `delay` before reconnection attempt `attempt`.
    Reconnecting { attempt: u32, delay: Duration },
    /// Reconnection gave up.
    Abandoned,
}

impl ConnectionStatus {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Resyncing => "Resyncing",
            ConnectionStatus::Reconnecting { .. } => "Reconnecting",
            ConnectionStatus::Abandoned => "Connection lost",
        }
    }
}

/// Choices the planning form offers, derived from the player mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnOptions {
    pub targets: Vec<String>,
    pub max_spend: u32,
}

/// Informational events that do not change what the form or HUD allows.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    TurnResolved {
        round: u32,
        results: Vec<TurnOutcome>,
    },
    BannerRequested {
        message: String,
        caster: Option<String>,
    },
    ShowdownStarted(ShowdownInfo),
    GameOver(GameOverInfo),
    /// The server confirmed our turn.
    ActionAcknowledged,
    BannerAcknowledged,
    ShowdownAcknowledged,
    PlayerSubmitted {
        codename: String,
    },
    AllianceFormed {
        members: Vec<String>,
    },
    HostTransferred,
    MasterPlanUpdated,
    AlliancesUpdated,
}

/// Receives session updates. All methods default to no-ops.
pub trait SessionObserver {
    fn phase_changed(&mut self, _from: GamePhase, _to: GamePhase) {}

    fn timer_tick(&mut self, _remaining: u32) {}

    fn timer_expired(&mut self, _phase: GamePhase) {}

    fn players_changed(&mut self, _players: &BTreeMap<String, PlayerView>) {}

    fn submission_accepted(&mut self, _round: u32) {}

    fn submission_rejected(&mut self, _reason: &SessionError) {}

    fn connection_status_changed(&mut self, _status: ConnectionStatus) {}

    fn resync_completed(&mut self, _phase: GamePhase) {}

    fn fatal_connection_lost(&mut self, _error: &SessionError) {}

    fn identity_assigned(&mut self, _codename: &str, _is_host: bool) {}

    fn join_failed(&mut self, _message: &str) {}

    /// A transient server complaint; no state changed.
    fn server_error(&mut self, _message: &str) {}

    fn turn_options_changed(&mut self, _options: &TurnOptions) {}

    fn notice(&mut self, _notice: &SessionNotice) {}
}

impl SessionObserver for () {}
