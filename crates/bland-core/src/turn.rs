//! The local agent's turn: drafting, validation and the once-per-round guard.

use crate::error::{RejectReason, SessionError, ValidationError};
use crate::phase::PhaseStateMachine;
use crate::protocol::{ClientMessage, GamePhase, INFORMATION_WARFARE, MAX_BANNER_CHARS};
use crate::session::SessionState;

/// Offense submitted when the planning countdown runs out.
pub const DEFAULT_OFFENSE: &str = "surveillance";

/// Defense submitted when the planning countdown runs out.
pub const DEFAULT_DEFENSE: &str = "safeHouse";

/// The editable contents of a turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnDraft {
    pub offense: String,
    pub defense: String,
    pub target: Option<String>,
    pub ip_spend: u32,
    pub banner_message: Option<String>,
}

impl TurnDraft {
    /// The turn sent on the agent's behalf when planning time expires.
    pub fn fallback() -> Self {
        Self {
            offense: DEFAULT_OFFENSE.to_string(),
            defense: DEFAULT_DEFENSE.to_string(),
            target: None,
            ip_spend: 0,
            banner_message: None,
        }
    }

    pub fn uses_banner(&self) -> bool {
        self.defense == INFORMATION_WARFARE
    }

    /// Check the draft against the last known session state.
    pub fn validate(&self, state: &SessionState) -> Result<(), ValidationError> {
        if self.offense.trim().is_empty() {
            return Err(ValidationError::MissingOffense);
        }
        if self.defense.trim().is_empty() {
            return Err(ValidationError::MissingDefense);
        }
        if self.uses_banner() {
            let banner = self.banner_message.as_deref().map(str::trim).unwrap_or("");
            if banner.is_empty() {
                return Err(ValidationError::MissingBannerMessage);
            }
            let chars = banner.chars().count();
            if chars > MAX_BANNER_CHARS {
                return Err(ValidationError::BannerTooLong { chars });
            }
        }
        if let Some(target) = self.target()
            && !state.is_valid_target(target)
        {
            return Err(ValidationError::InvalidTarget {
                target: target.to_string(),
            });
        }
        let balance = state.local_balance();
        if self.ip_spend > balance {
            return Err(ValidationError::SpendExceedsBalance {
                spend: self.ip_spend,
                balance,
            });
        }
        Ok(())
    }

    /// The target, treating an empty selection as none.
    fn target(&self) -> Option<&str> {
        self.target.as_deref().filter(|t| !t.trim().is_empty())
    }

    fn to_message(&self) -> ClientMessage {
        let banner_message = if self.uses_banner() {
            self.banner_message
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .to_string()
        } else {
            String::new()
        };
        ClientMessage::SubmitAction {
            offense: self.offense.clone(),
            defense: self.defense.clone(),
            target: self.target().map(str::to_string),
            ip_spend: self.ip_spend,
            banner_message,
        }
    }
}

/// The draft of the current planning phase.
///
/// Created empty on every entry into planning and frozen once submitted or
/// once the round moves to resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTurn {
    draft: TurnDraft,
    frozen: bool,
}

impl PendingTurn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &TurnDraft {
        &self.draft
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn edit(&mut self, f: impl FnOnce(&mut TurnDraft)) -> Result<(), RejectReason> {
        if self.frozen {
            return Err(RejectReason::DraftLocked);
        }
        f(&mut self.draft);
        Ok(())
    }

    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }
}

/// Where a submission request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitSource {
    /// The user pressed submit; the current draft is sent.
    Manual,
    /// The planning countdown expired; [`TurnDraft::fallback`] is sent.
    Expiry,
}

/// "Has this session already sent a turn for the current round."
///
/// Bound to the planning epoch it was set in, so it reads as unset again as
/// soon as the machine enters planning anew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmissionGuard {
    epoch: Option<u64>,
}

impl SubmissionGuard {
    pub fn is_set_for(&self, planning_epoch: u64) -> bool {
        self.epoch == Some(planning_epoch)
    }

    fn set(&mut self, planning_epoch: u64) {
        self.epoch = Some(planning_epoch);
    }
}

/// Enforces at most one accepted submission per round.
#[derive(Debug, Clone, Default)]
pub struct TurnSubmissionTracker {
    guard: SubmissionGuard,
}

impl TurnSubmissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_submitted(&self, machine: &PhaseStateMachine) -> bool {
        self.guard.is_set_for(machine.planning_epoch())
    }

    /// Accept or refuse a submission and build the message to send.
    ///
    /// On acceptance the guard is set and the draft frozen before the message
    /// is returned, so a second request can never produce another send.
    pub fn submit(
        &mut self,
        machine: &mut PhaseStateMachine,
        source: SubmitSource,
    ) -> Result<ClientMessage, SessionError> {
        let phase = machine.state().phase();
        if phase != GamePhase::Planning {
            return Err(RejectReason::WrongPhase {
                phase,
                action: "submitAction",
            }
            .into());
        }
        if self.has_submitted(machine) {
            return Err(RejectReason::AlreadySubmitted {
                round: machine.state().round_number(),
            }
            .into());
        }

        let draft = match source {
            SubmitSource::Manual => machine.draft().draft().clone(),
            SubmitSource::Expiry => TurnDraft::fallback(),
        };
        draft.validate(machine.state())?;

        self.guard.set(machine.planning_epoch());
        machine.freeze_draft();
        tracing::info!(
            round = machine.state().round_number(),
            ?source,
            offense = %draft.offense,
            defense = %draft.defense,
            "turn accepted"
        );
        Ok(draft.to_message())
    }
}
