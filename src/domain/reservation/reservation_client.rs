use async_trait::async_trait;

use crate::domain::reservation::reservation::{Reservation, ReservationDraft, ReservationId, ReservationStatus, ReservationWindow, ServerCandidates};
use crate::domain::utils::id::SteamId;
use crate::error::Result;

/// Remote lifecycle of reservations.
///
/// Implementations never retry. Retry policy belongs to the orchestrator, which
/// can tell a transient transport failure from a definitive rejection.
#[async_trait]
pub trait ReservationClient: Send + Sync {
    /// Next reservable window for `identity`.
    async fn query_upcoming_window(&self, identity: &SteamId) -> Result<ReservationWindow>;

    async fn find_servers(&self, window: &ReservationWindow, identity: &SteamId) -> Result<ServerCandidates>;

    /// # Errors
    /// `Rejection::AlreadyReserved` when the identity already holds an active
    /// reservation, `Rejection::NotFound` when the server or window is gone.
    async fn create(&self, draft: &ReservationDraft, identity: &SteamId) -> Result<Reservation>;

    async fn fetch(&self, id: ReservationId, identity: &SteamId) -> Result<Reservation>;

    async fn status(&self, id: ReservationId, identity: &SteamId) -> Result<ReservationStatus> {
        Ok(self.fetch(id, identity).await?.status)
    }

    async fn ended(&self, id: ReservationId, identity: &SteamId) -> Result<bool> {
        Ok(self.fetch(id, identity).await?.has_ended())
    }

    /// Releasing an already ended or unknown reservation is not an error.
    async fn delete(&self, id: ReservationId, identity: &SteamId) -> Result<()>;

    /// Location of the post-match archive. `None` until the reservation has ended.
    async fn artifact_url(&self, id: ReservationId, identity: &SteamId) -> Result<Option<String>> {
        Ok(self.fetch(id, identity).await?.artifact_url)
    }
}
