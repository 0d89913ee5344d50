use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtocolError, ValidationError};

/// Longest codename the lobby accepts, counted in characters after trimming.
pub const MAX_CODENAME_CHARS: usize = 16;

/// Longest banner message an information-warfare defense may carry.
pub const MAX_BANNER_CHARS: usize = 50;

/// Defense id that requires a banner message.
pub const INFORMATION_WARFARE: &str = "informationWarfare";

/// Number of held gadgets the HUD shows per player.
pub const VISIBLE_GADGETS: usize = 3;

/// Stage of the round lifecycle the session is in.
///
/// Accepts both the client's camelCase names and the server's snake_case
/// names on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GamePhase {
    Lobby,
    Planning,
    Resolution,
    #[serde(alias = "banner", alias = "banner_choice")]
    BannerChoice,
    #[serde(alias = "waiting_for_resolution")]
    WaitingForResolution,
    #[serde(alias = "final_showdown")]
    FinalShowdown,
    #[serde(alias = "game_over")]
    GameOver,
}

impl GamePhase {
    /// Every phase, in lifecycle order.
    pub const ALL: [GamePhase; 7] = [
        GamePhase::Lobby,
        GamePhase::Planning,
        GamePhase::Resolution,
        GamePhase::BannerChoice,
        GamePhase::WaitingForResolution,
        GamePhase::FinalShowdown,
        GamePhase::GameOver,
    ];

    pub fn label(self) -> &'static str {
        match self {
            GamePhase::Lobby => "lobby",
            GamePhase::Planning => "planning",
            GamePhase::Resolution => "resolution",
            GamePhase::BannerChoice => "bannerChoice",
            GamePhase::WaitingForResolution => "waitingForResolution",
            GamePhase::FinalShowdown => "finalShowdown",
            GamePhase::GameOver => "gameOver",
        }
    }

    /// Lobby and GameOver bracket a running game.
    pub fn is_in_game(self) -> bool {
        !matches!(self, GamePhase::Lobby | GamePhase::GameOver)
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Standing of an agent in the game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    #[default]
    Active,
    Compromised,
    Burned,
    Captured,
    Eliminated,
}

impl PlayerStatus {
    /// Captured and eliminated agents can no longer be targeted.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            PlayerStatus::Active | PlayerStatus::Compromised | PlayerStatus::Burned
        )
    }
}

/// One entry of the player mapping, as last reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub codename: String,
    /// Influence-point balance.
    #[serde(rename = "ip", default)]
    pub influence: u32,
    #[serde(default)]
    pub status: PlayerStatus,
    /// Held gadget ids, unordered.
    #[serde(default)]
    pub gadgets: Vec<String>,
    #[serde(default, alias = "intel_count", skip_serializing_if = "Option::is_none")]
    pub intel_count: Option<u32>,
    #[serde(default)]
    pub disconnected: bool,
}

impl PlayerView {
    pub fn new(codename: &str, influence: u32) -> Self {
        Self {
            codename: codename.to_string(),
            influence,
            status: PlayerStatus::Active,
            gadgets: Vec::new(),
            intel_count: None,
            disconnected: false,
        }
    }

    /// The gadgets the HUD has room for.
    pub fn visible_gadgets(&self) -> &[String] {
        &self.gadgets[..self.gadgets.len().min(VISIBLE_GADGETS)]
    }
}

/// One resolved interaction from a `turnResult`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    #[serde(default)]
    pub attacker: String,
    #[serde(default)]
    pub defender: String,
    #[serde(default)]
    pub offense: String,
    #[serde(default)]
    pub defense: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "ip_changes", skip_serializing_if = "Option::is_none")]
    pub ip_changes: Option<Value>,
    #[serde(default, alias = "status_changes", skip_serializing_if = "Option::is_none")]
    pub status_changes: Option<Value>,
}

/// Payload of `finalShowdownStarted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowdownInfo {
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub rules: String,
    #[serde(default)]
    pub ip_bonus: u32,
    #[serde(default = "default_showdown_secs")]
    pub time_limit: u32,
    #[serde(default)]
    pub available_actions: Vec<String>,
}

fn default_showdown_secs() -> u32 {
    30
}

/// Payload of `gameOver`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOverInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    #[serde(default)]
    pub winners: Vec<String>,
    #[serde(default, alias = "condition", skip_serializing_if = "Option::is_none")]
    pub victory_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "finalResults")]
    pub final_standings: Value,
}

/// The local agent as the server remembers it, embedded in snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotUser {
    #[serde(default)]
    pub codename: Option<String>,
}

/// Authoritative description of the session, used to resynchronize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub phase: GamePhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<PlayerView>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<u32>,
    #[serde(default, alias = "roundNumber", skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_started: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_state: Option<SnapshotUser>,
}

impl GameSnapshot {
    pub fn new(phase: GamePhase) -> Self {
        Self {
            phase,
            players: None,
            time_remaining: None,
            round: None,
            game_started: None,
            user_state: None,
        }
    }
}

/// How the local agent reacts to an enemy banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BannerResponse {
    Believe,
    Ignore,
}

impl BannerResponse {
    pub fn label(self) -> &'static str {
        match self {
            BannerResponse::Believe => "believe",
            BannerResponse::Ignore => "ignore",
        }
    }
}

impl fmt::Display for BannerResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Enter the lobby under a codename.
    JoinLobby { codename: String },

    /// Host only: leave the lobby and start round one.
    StartGame,

    /// The local agent's turn for the current round.
    SubmitAction {
        offense: String,
        defense: String,
        target: Option<String>,
        ip_spend: u32,
        banner_message: String,
    },

    /// Reaction to an enemy banner.
    BannerChoice { choice: BannerResponse },

    /// Final showdown move.
    SubmitShowdownAction { action: String },

    GetMasterPlan,

    GetAlliances,

    /// Ask for a `gameStateSnapshot`.
    RequestGameState,

    /// Propose an alliance with another agent.
    CreateAlliance { target: String },
}

impl ClientMessage {
    /// The wire event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::JoinLobby { .. } => "joinLobby",
            ClientMessage::StartGame => "startGame",
            ClientMessage::SubmitAction { .. } => "submitAction",
            ClientMessage::BannerChoice { .. } => "bannerChoice",
            ClientMessage::SubmitShowdownAction { .. } => "submitShowdownAction",
            ClientMessage::GetMasterPlan => "getMasterPlan",
            ClientMessage::GetAlliances => "getAlliances",
            ClientMessage::RequestGameState => "requestGameState",
            ClientMessage::CreateAlliance { .. } => "createAlliance",
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Answer to `joinLobby`.
    LobbyJoined {
        success: bool,
        #[serde(default)]
        codename: Option<String>,
        #[serde(default)]
        is_host: bool,
        #[serde(default)]
        message: Option<String>,
    },

    /// Lobby roster changed.
    LobbyUpdate {
        players: Vec<PlayerView>,
        #[serde(default)]
        host: Option<String>,
    },

    GameStarted {
        #[serde(default)]
        players: Vec<PlayerView>,
        #[serde(default = "first_round")]
        round_number: u32,
    },

    /// Every submitted turn of `round` has been resolved.
    TurnResult {
        players: Vec<PlayerView>,
        round: u32,
        #[serde(default)]
        results: Vec<TurnOutcome>,
    },

    GameStateSnapshot(GameSnapshot),

    GameOver(GameOverInfo),

    /// An enemy banner is flying; the agent must believe or ignore it.
    BannerChoice {
        message: String,
        #[serde(default)]
        caster: Option<String>,
    },

    FinalShowdownStarted { showdown: ShowdownInfo },

    /// Transient server-side complaint.
    Error { message: String },

    NextRound { round_number: u32 },

    /// Acknowledges our `submitAction`.
    ActionSubmitted {
        #[serde(default)]
        success: bool,
    },

    /// Another agent locked in a turn.
    PlayerSubmitted {
        codename: String,
        #[serde(default)]
        submitted_count: Option<u32>,
        #[serde(default)]
        total_players: Option<u32>,
    },

    BannerResponseRecorded {
        #[serde(default)]
        success: bool,
    },

    ShowdownActionSubmitted {
        #[serde(default)]
        success: bool,
    },

    MasterPlanInfo {
        #[serde(flatten)]
        plan: Map<String, Value>,
    },

    AllianceInfo {
        #[serde(default)]
        player_alliances: Value,
        #[serde(default)]
        all_alliances: Value,
    },

    AllianceCreated {
        #[serde(default)]
        alliance_id: Value,
        #[serde(default)]
        members: Vec<String>,
        #[serde(default)]
        round: Option<u32>,
    },

    HostTransferred { new_host: String },
}

fn first_round() -> u32 {
    1
}

impl ServerMessage {
    /// The wire event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::LobbyJoined { .. } => "lobbyJoined",
            ServerMessage::LobbyUpdate { .. } => "lobbyUpdate",
            ServerMessage::GameStarted { .. } => "gameStarted",
            ServerMessage::TurnResult { .. } => "turnResult",
            ServerMessage::GameStateSnapshot(_) => "gameStateSnapshot",
            ServerMessage::GameOver(_) => "gameOver",
            ServerMessage::BannerChoice { .. } => "bannerChoice",
            ServerMessage::FinalShowdownStarted { .. } => "finalShowdownStarted",
            ServerMessage::Error { .. } => "error",
            ServerMessage::NextRound { .. } => "nextRound",
            ServerMessage::ActionSubmitted { .. } => "actionSubmitted",
            ServerMessage::PlayerSubmitted { .. } => "playerSubmitted",
            ServerMessage::BannerResponseRecorded { .. } => "bannerResponseRecorded",
            ServerMessage::ShowdownActionSubmitted { .. } => "showdownActionSubmitted",
            ServerMessage::MasterPlanInfo { .. } => "masterPlanInfo",
            ServerMessage::AllianceInfo { .. } => "allianceInfo",
            ServerMessage::AllianceCreated { .. } => "allianceCreated",
            ServerMessage::HostTransferred { .. } => "hostTransferred",
        }
    }
}

// ---------------------------------------------------------------------------
// Wire-level decoding
// ---------------------------------------------------------------------------

/// Decode one text frame into a [`ServerMessage`].
///
/// Unknown event types and payloads that do not match their event's shape are
/// reported as [`ProtocolError::MalformedFrame`] so that nothing is applied
/// partially.
pub fn decode_server_frame(frame: &str) -> Result<ServerMessage, ProtocolError> {
    let trimmed = frame.trim();
    if trimmed.is_empty() {
        return Err(ProtocolError::MalformedFrame {
            reason: "empty frame".to_string(),
        });
    }
    serde_json::from_str(trimmed).map_err(|e| ProtocolError::MalformedFrame {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Codename validation
// ---------------------------------------------------------------------------

/// Validate a codename and return it trimmed.
///
/// Codenames must be 1 to 16 characters once surrounding whitespace is removed.
pub fn validate_codename(codename: &str) -> Result<String, ValidationError> {
    let trimmed = codename.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyCodename);
    }
    let chars = trimmed.chars().count();
    if chars > MAX_CODENAME_CHARS {
        return Err(ValidationError::CodenameTooLong { chars });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_codenames() {
        assert_eq!(validate_codename("Zed").unwrap(), "Zed");
        assert_eq!(validate_codename("  Moneypenny ").unwrap(), "Moneypenny");
        assert!(validate_codename("1234567890123456").is_ok()); // 16 chars
    }

    #[test]
    fn invalid_codenames() {
        assert_eq!(validate_codename(""), Err(ValidationError::EmptyCodename));
        assert_eq!(validate_codename("   "), Err(ValidationError::EmptyCodename));
        assert_eq!(
            validate_codename("12345678901234567"),
            Err(ValidationError::CodenameTooLong { chars: 17 })
        );
    }

    #[test]
    fn decodes_snapshot_with_server_phase_names() {
        let frame = r#"{"type":"gameStateSnapshot","phase":"final_showdown","roundNumber":4,
            "players":[{"codename":"Zed","ip":7,"status":"burned","sid":"abc"}],
            "userState":{"codename":"Zed","ip":7}}"#;
        let ServerMessage::GameStateSnapshot(snapshot) = decode_server_frame(frame).unwrap() else {
            panic!("expected a snapshot");
        };
        assert_eq!(snapshot.phase, GamePhase::FinalShowdown);
        assert_eq!(snapshot.round, Some(4));
        assert_eq!(snapshot.time_remaining, None);
        let players = snapshot.players.unwrap();
        assert_eq!(players[0].influence, 7);
        assert_eq!(players[0].status, PlayerStatus::Burned);
        assert_eq!(snapshot.user_state.unwrap().codename.as_deref(), Some("Zed"));
    }

    #[test]
    fn decodes_lobby_joined() {
        let frame = r#"{"type":"lobbyJoined","success":true,"codename":"Zed","isHost":false}"#;
        assert_eq!(
            decode_server_frame(frame).unwrap(),
            ServerMessage::LobbyJoined {
                success: true,
                codename: Some("Zed".to_string()),
                is_host: false,
                message: None,
            }
        );
    }

    #[test]
    fn decodes_showdown_with_defaults() {
        let frame = r#"{"type":"finalShowdownStarted",
            "showdown":{"participants":["A","B"],"rules":"higher roll wins","ip_bonus":3}}"#;
        let ServerMessage::FinalShowdownStarted { showdown } = decode_server_frame(frame).unwrap()
        else {
            panic!("expected a showdown");
        };
        assert_eq!(showdown.time_limit, 30);
        assert_eq!(showdown.ip_bonus, 3);
        assert!(showdown.available_actions.is_empty());
    }

    #[test]
    fn decodes_master_plan_as_open_object() {
        let frame = r#"{"type":"masterPlanInfo","plan_name":"Operation Crow","progress":2}"#;
        let ServerMessage::MasterPlanInfo { plan } = decode_server_frame(frame).unwrap() else {
            panic!("expected master plan info");
        };
        assert_eq!(plan.get("progress"), Some(&Value::from(2)));
    }

    #[test]
    fn rejects_unknown_and_malformed_frames() {
        assert!(matches!(
            decode_server_frame(r#"{"type":"teleport","to":"moon"}"#),
            Err(ProtocolError::MalformedFrame { .. })
        ));
        assert!(matches!(
            decode_server_frame(r#"{"type":"turnResult","round":"two"}"#),
            Err(ProtocolError::MalformedFrame { .. })
        ));
        assert!(decode_server_frame("  ").is_err());
    }

    #[test]
    fn submit_action_uses_camel_case_fields() {
        let msg = ClientMessage::SubmitAction {
            offense: "sabotage".to_string(),
            defense: "safeHouse".to_string(),
            target: None,
            ip_spend: 2,
            banner_message: String::new(),
        };
        let json: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "submitAction");
        assert_eq!(json["ipSpend"], 2);
        assert_eq!(json["bannerMessage"], "");
        assert!(json["target"].is_null());
        assert_eq!(msg.event_name(), "submitAction");
    }

    #[test]
    fn visible_gadgets_are_capped() {
        let mut view = PlayerView::new("Zed", 3);
        view.gadgets = ["a", "b", "c", "d"].iter().map(|g| g.to_string()).collect();
        assert_eq!(view.visible_gadgets().len(), VISIBLE_GADGETS);
    }
}
