use std::fmt;
use std::path::PathBuf;
use tokio::task::JoinHandle;

use crate::domain::orchestrator::state::ProvisioningPhase;
use crate::domain::provisioning::provisioning_client::BestEffort;
use crate::domain::reservation::reservation::ReservationId;
use crate::domain::utils::id::MatchId;
use crate::error::{Error, ErrorKind};

/// What happened to a reservation that was held when the workflow failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    NotNeeded,
    Released,
    /// The delete itself failed. The reservation may still be held remotely.
    Failed(String),
}

/// Human-facing account of a failed match workflow.
#[derive(Debug)]
pub struct ErrorReport {
    pub match_id: MatchId,
    pub failed_phase: ProvisioningPhase,
    pub reservation_id: Option<ReservationId>,
    pub error: Error,
    pub compensation: Compensation,
}

impl ErrorReport {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "match {} failed while {}", self.match_id, self.failed_phase)?;
        if let Some(id) = self.reservation_id {
            write!(f, " (reservation {})", id)?;
        }
        write!(f, ": {}", self.error)?;
        match &self.compensation {
            Compensation::NotNeeded => Ok(()),
            Compensation::Released => write!(f, "; reservation released"),
            Compensation::Failed(reason) => write!(f, "; releasing the reservation failed: {}", reason),
        }
    }
}

impl std::error::Error for ErrorReport {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOutcome {
    Archived(PathBuf),
    /// The reservation never advertised an archive, or it held no demo.
    Unavailable,
    /// No archive collaborator is configured.
    Skipped,
    Failed(String),
}

/// Result of a completed teardown. The artifact keeps downloading in the background.
#[derive(Debug)]
pub struct TeardownReport {
    pub match_id: MatchId,
    pub reservation_id: Option<ReservationId>,
    pub end: BestEffort,
    pub artifact: JoinHandle<ArtifactOutcome>,
}
