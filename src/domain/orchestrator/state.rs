use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::domain::orchestrator::roster::Roster;
use crate::domain::reservation::reservation::{ReservationId, ServerDescriptor};
use crate::domain::utils::id::MatchId;
use crate::error::{Error, Result};

/// Phases of one match's server lifecycle.
///
/// `Pending -> Reserving -> Reserved -> Configuring -> Live -> Ending -> Ended`,
/// with `Errored` reachable from every non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProvisioningPhase {
    Pending,
    Reserving,
    Reserved,
    Configuring,
    Live,
    Ending,
    Ended,
    Errored,
}

impl ProvisioningPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Errored)
    }

    pub fn can_transition_to(&self, next: ProvisioningPhase) -> bool {
        use ProvisioningPhase::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (*self, next),
            (_, Errored) | (Pending, Reserving) | (Reserving, Reserved) | (Reserved, Configuring) | (Configuring, Live) | (Live, Ending) | (Ending, Ended)
        )
    }

    /// A reservation exists but the server was never handed to the players.
    pub fn holds_unused_reservation(&self) -> bool {
        matches!(self, Self::Reserved | Self::Configuring)
    }
}

impl fmt::Display for ProvisioningPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseChange {
    pub phase: ProvisioningPhase,
    pub at: DateTime<Utc>,
}

/// Local view of one match: where it is, what it holds, and what went wrong last.
#[derive(Debug, Clone)]
pub struct MatchProvisioningState {
    pub match_id: MatchId,
    pub phase: ProvisioningPhase,
    pub reservation_id: Option<ReservationId>,
    pub server: Option<ServerDescriptor>,
    pub last_error: Option<String>,
    pub roster: Roster,
    pub history: Vec<PhaseChange>,
}

impl MatchProvisioningState {
    pub fn new(match_id: MatchId) -> Self {
        Self {
            match_id,
            phase: ProvisioningPhase::Pending,
            reservation_id: None,
            server: None,
            last_error: None,
            roster: Roster::default(),
            history: vec![PhaseChange { phase: ProvisioningPhase::Pending, at: Utc::now() }],
        }
    }

    /// # Errors
    /// `Error::InvalidTransition` when `next` is not reachable from the current phase.
    pub fn advance(&mut self, next: ProvisioningPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(Error::InvalidTransition { from: self.phase, to: next });
        }
        log::info!("Match {}: {} -> {}", self.match_id, self.phase, next);
        self.phase = next;
        self.history.push(PhaseChange { phase: next, at: Utc::now() });
        Ok(())
    }

    /// Moves to `Errored` and records the error. A terminal match keeps its phase.
    pub fn fail(&mut self, error: &Error) {
        self.last_error = Some(error.to_string());
        if self.phase.is_terminal() {
            log::warn!("Match {} already {}; not recording failure as a transition: {}", self.match_id, self.phase, error);
            return;
        }
        log::error!("Match {} failed in phase {}: {}", self.match_id, self.phase, error);
        self.phase = ProvisioningPhase::Errored;
        self.history.push(PhaseChange { phase: ProvisioningPhase::Errored, at: Utc::now() });
    }
}
