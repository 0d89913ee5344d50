//! Error taxonomy of the session core.
//!
//! Every failure a frontend can observe is a [`SessionError`]. Validation and
//! rejection errors never touch session state or the network, so the action
//! that produced them can always be retried.

use thiserror::Error;

use crate::protocol::{GamePhase, MAX_BANNER_CHARS, MAX_CODENAME_CHARS};

/// Malformed local input: a turn or codename the server would refuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("codename cannot be empty")]
    EmptyCodename,

    #[error("codename must be at most {max} characters (got {chars})", max = MAX_CODENAME_CHARS)]
    CodenameTooLong { chars: usize },

    #[error("select an offensive operation")]
    MissingOffense,

    #[error("select a defensive measure")]
    MissingDefense,

    #[error("information warfare needs a banner message")]
    MissingBannerMessage,

    #[error("banner message must be at most {max} characters (got {chars})", max = MAX_BANNER_CHARS)]
    BannerTooLong { chars: usize },

    #[error("cannot spend {spend} IP with a balance of {balance}")]
    SpendExceedsBalance { spend: u32, balance: u32 },

    #[error("'{target}' is not a valid target")]
    InvalidTarget { target: String },

    #[error("'{action}' is not an available showdown action")]
    UnknownShowdownAction { action: String },
}

/// A well-formed local action refused in the current session state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("{action} is not allowed during {phase}")]
    WrongPhase {
        phase: GamePhase,
        action: &'static str,
    },

    #[error("a turn was already submitted for round {round}")]
    AlreadySubmitted { round: u32 },

    #[error("the planning draft is locked")]
    DraftLocked,

    #[error("only the host can start the game")]
    NotHost,

    #[error("need at least 2 players to start (have {count})")]
    NotEnoughPlayers { count: usize },

    #[error("already joined as {codename}")]
    AlreadyJoined { codename: String },

    #[error("waiting for the server to resynchronize the session")]
    Stale,

    #[error("not connected to the server")]
    Disconnected,

    #[error("an action was already recorded")]
    AlreadyRecorded,
}

/// Something the server sent that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("{event} is not legal during {phase}")]
    IllegalTransition {
        phase: GamePhase,
        event: &'static str,
    },

    #[error("server error: {message}")]
    Server { message: String },
}

/// The channel to the server failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection closed: {reason}")]
    Closed { reason: String },
}

/// Top-level error type of the session core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Rejected(#[from] RejectReason),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Reconnection gave up. The session must be restarted by the user.
    #[error("connection lost after {attempts} reconnection attempts")]
    ConnectionAbandoned { attempts: u32 },

    /// The link is open but the server never answered with a snapshot.
    #[error("no game state after {requests} requests")]
    ResyncTimedOut { requests: u32 },
}

impl SessionError {
    /// Whether the core keeps working after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            SessionError::ConnectionAbandoned { .. } | SessionError::ResyncTimedOut { .. }
        )
    }
}
