use futures::future::join_all;
use rand::Rng;
use rand::distr::Alphanumeric;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::api::match_plan_dto::MatchPlanDto;
use crate::domain::archive::demo_archive::DemoArchive;
use crate::domain::facade::match_directory::MatchDirectory;
use crate::domain::match_format::{MatchType, Team};
use crate::domain::orchestrator::report::{ArtifactOutcome, Compensation, ErrorReport, TeardownReport};
use crate::domain::orchestrator::roster::{Roster, RosterOp, RosterSequencer};
use crate::domain::orchestrator::state::{MatchProvisioningState, ProvisioningPhase};
use crate::domain::provisioning::command::{End, Exists, ReExecConfig, Say, SetupServer, VerifyInfo};
use crate::domain::provisioning::provisioning_client::{BestEffort, ProvisioningClient};
use crate::domain::reservation::reservation::{ReservationDraft, ReservationId, ReservationStatus, ReservationWindow};
use crate::domain::reservation::reservation_client::ReservationClient;
use crate::domain::utils::id::{MatchId, SteamId};
use crate::domain::utils::retry::RetryPolicy;
use crate::error::{Error, Rejection, Result};

const PASSWORD_LENGTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub steam_id: SteamId,
    pub name: String,
    pub slot: u8,
}

/// Everything needed to take one match from nothing to a live server.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub match_id: MatchId,
    pub match_type: MatchType,
    pub league: String,
    pub whitelist: String,
    pub map: String,
    pub draft: ReservationDraft,
    pub participants: Vec<Participant>,
    /// When set, a reservation on any other server is released and reported.
    pub expected_server_id: Option<u64>,
}

impl ProvisionRequest {
    /// Builds a request from a match plan. Fresh rcon and server passwords are generated.
    pub fn from_plan(plan: MatchPlanDto, window: ReservationWindow) -> Result<Self> {
        let match_type: MatchType = plan.match_type.parse()?;

        let participants = plan
            .players
            .iter()
            .map(|player| {
                let team: Team = player.team.parse()?;
                Ok(Participant { steam_id: SteamId::new(player.steam_id.clone()), name: player.name.clone(), slot: match_type.slot_for(team, &player.class)? })
            })
            .collect::<Result<Vec<_>>>()?;

        let draft = ReservationDraft {
            window,
            server_id: plan.server_id,
            rcon_password: generate_password(),
            server_password: generate_password(),
            first_map: Some(plan.map.clone()),
            whitelist_id: plan.whitelist_id,
            server_config_id: plan.server_config_id,
        };

        Ok(Self {
            match_id: MatchId::new(plan.match_id),
            match_type,
            league: plan.league,
            whitelist: plan.whitelist,
            map: plan.map,
            draft,
            participants,
            expected_server_id: Some(plan.server_id),
        })
    }
}

fn generate_password() -> String {
    rand::rng().sample_iter(&Alphanumeric).take(PASSWORD_LENGTH).map(char::from).collect()
}

/// Bounded polling. Zero attempts disables the poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub const fn disabled() -> Self {
        Self { attempts: 0, interval: Duration::ZERO }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Identity every reservation call is made on behalf of.
    pub identity: SteamId,
    pub retry: RetryPolicy,
    pub roster_retry: RetryPolicy,
    /// Wait for the reservation to report `active` before configuring.
    pub readiness: PollPolicy,
    pub artifact_poll: PollPolicy,
}

impl OrchestratorConfig {
    pub fn new(identity: SteamId) -> Self {
        Self {
            identity,
            retry: RetryPolicy::default(),
            roster_retry: RetryPolicy::default(),
            readiness: PollPolicy::disabled(),
            artifact_poll: PollPolicy { attempts: 10, interval: Duration::from_secs(30) },
        }
    }
}

/// Drives match servers through their lifecycle.
///
/// Cheap to clone; every match runs as its own task against the shared clients.
#[derive(Clone)]
pub struct Orchestrator {
    reservations: Arc<dyn ReservationClient>,
    provisioning: Arc<dyn ProvisioningClient>,
    directory: Arc<dyn MatchDirectory>,
    archive: Option<Arc<dyn DemoArchive>>,
    config: Arc<OrchestratorConfig>,
}

impl Orchestrator {
    pub fn new(
        reservations: Arc<dyn ReservationClient>,
        provisioning: Arc<dyn ProvisioningClient>,
        directory: Arc<dyn MatchDirectory>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { reservations, provisioning, directory, archive: None, config: Arc::new(config) }
    }

    pub fn with_archive(mut self, archive: Arc<dyn DemoArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn spawn(&self, request: ProvisionRequest) -> JoinHandle<std::result::Result<MatchSession, ErrorReport>> {
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.provision(request).await })
    }

    /// Reserves, configures and opens the server for one match.
    ///
    /// # Returns
    /// A live session, or a report of where the workflow stopped. A reservation
    /// that was created but never went live has been released by then.
    #[tracing::instrument(skip(self, request), fields(match_id = %request.match_id))]
    pub async fn provision(&self, request: ProvisionRequest) -> std::result::Result<MatchSession, ErrorReport> {
        let state = Arc::new(Mutex::new(MatchProvisioningState::new(request.match_id.clone())));

        if let Err(error) = self.drive(&request, &state).await {
            return Err(self.fail(&state, error).await);
        }

        let session = MatchSession::open(self.clone(), &request, state);
        session.populate(&request.participants).await;
        Ok(session)
    }

    async fn drive(&self, request: &ProvisionRequest, state: &Mutex<MatchProvisioningState>) -> Result<()> {
        let identity = &self.config.identity;

        transition(state, ProvisioningPhase::Reserving)?;
        let reservation = self.reservations.create(&request.draft, identity).await?;
        let descriptor = reservation.descriptor(&request.draft);
        with_state(state, |s| {
            s.reservation_id = Some(reservation.id);
            s.server = Some(descriptor.clone());
            s.advance(ProvisioningPhase::Reserved)
        })?;

        if let Some(expected) = request.expected_server_id {
            let actual = descriptor.server_id.unwrap_or_default();
            if actual != expected {
                return Err(Rejection::ServerMismatch { expected, actual }.into());
            }
        }
        self.await_ready(reservation.id, reservation.status).await?;

        // An unreachable or foreign server fails here, while the reservation is still unused.
        let verify = VerifyInfo { server: descriptor.clone() };
        self.config
            .retry
            .run("Pauling.VerifyInfo", || {
                let provisioning = self.provisioning.clone();
                let args = verify.clone();
                async move { provisioning.verify_server_info(args).await }
            })
            .await?;

        transition(state, ProvisioningPhase::Configuring)?;
        let setup = SetupServer {
            match_id: request.match_id.clone(),
            server: descriptor,
            match_type: request.match_type,
            league: request.league.clone(),
            whitelist: request.whitelist.clone(),
            map: request.map.clone(),
        };
        self.config
            .retry
            .run("Pauling.SetupServer", || {
                let provisioning = self.provisioning.clone();
                let args = setup.clone();
                async move { provisioning.setup_server(args).await }
            })
            .await?;

        transition(state, ProvisioningPhase::Live)
    }

    async fn await_ready(&self, id: ReservationId, initial: ReservationStatus) -> Result<()> {
        let policy = self.config.readiness;
        if policy.attempts == 0 || initial == ReservationStatus::Active {
            return Ok(());
        }

        let identity = &self.config.identity;
        for attempt in 1..=policy.attempts {
            let reservation = self.config.retry.run("reservation status", || self.reservations.fetch(id, identity)).await?;
            if reservation.has_ended() || reservation.status == ReservationStatus::Error {
                return Err(Rejection::ReservationFailed { id: id.0, status: reservation.status.to_string() }.into());
            }
            if reservation.status == ReservationStatus::Active {
                return Ok(());
            }
            log::debug!("Reservation {} still {} (check {}/{}).", id, reservation.status, attempt, policy.attempts);
            if attempt < policy.attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }
        Err(Error::Transport(format!("reservation {} did not become active after {} checks", id, policy.attempts)))
    }

    /// Releases an unused reservation, then marks the match `Errored`.
    async fn fail(&self, state: &Mutex<MatchProvisioningState>, error: Error) -> ErrorReport {
        let (match_id, phase, reservation_id) = with_state(state, |s| (s.match_id.clone(), s.phase, s.reservation_id));

        let compensation = match reservation_id {
            Some(id) if phase.holds_unused_reservation() => {
                log::warn!("Match {}: releasing reservation {} after failure while {}.", match_id, id, phase);
                match self.reservations.delete(id, &self.config.identity).await {
                    Ok(()) => Compensation::Released,
                    Err(e) => {
                        log::error!("Match {}: reservation {} could not be released: {}", match_id, id, e);
                        Compensation::Failed(e.to_string())
                    }
                }
            }
            _ => Compensation::NotNeeded,
        };

        with_state(state, |s| s.fail(&error));
        ErrorReport { match_id, failed_phase: phase, reservation_id, error, compensation }
    }
}

fn with_state<R>(state: &Mutex<MatchProvisioningState>, f: impl FnOnce(&mut MatchProvisioningState) -> R) -> R {
    let mut guard = state.lock().expect("Mutex poisoned");
    f(&mut guard)
}

fn transition(state: &Mutex<MatchProvisioningState>, next: ProvisioningPhase) -> Result<()> {
    with_state(state, |s| s.advance(next))
}

/// Handle to one live match. Clones share the same match.
#[derive(Clone)]
pub struct MatchSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    orchestrator: Orchestrator,
    match_id: MatchId,
    state: Arc<Mutex<MatchProvisioningState>>,
    roster: RosterSequencer,
    population_failures: Mutex<Vec<(SteamId, String)>>,
}

impl MatchSession {
    fn open(orchestrator: Orchestrator, request: &ProvisionRequest, state: Arc<Mutex<MatchProvisioningState>>) -> Self {
        let directory = orchestrator.directory.clone();
        directory.register_match(&request.match_id, request.match_type);
        for participant in &request.participants {
            if let Err(e) = directory.assign_slot(&request.match_id, &participant.steam_id, &participant.name, participant.slot) {
                log::warn!("Match {}: {}", request.match_id, e);
            }
        }

        let roster = RosterSequencer::spawn(
            request.match_id.clone(),
            orchestrator.provisioning.clone(),
            directory,
            state.clone(),
            orchestrator.config.roster_retry,
        );

        Self {
            inner: Arc::new(SessionInner {
                orchestrator,
                match_id: request.match_id.clone(),
                state,
                roster,
                population_failures: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Allows every participant. Failures are recorded; the match stays live.
    async fn populate(&self, participants: &[Participant]) {
        let submitted: Vec<_> = participants.iter().map(|p| self.allow_player(p.steam_id.clone())).collect();
        let results = join_all(submitted).await;

        let mut failures = self.inner.population_failures.lock().expect("Mutex poisoned");
        for (participant, result) in participants.iter().zip(results) {
            if let Err(e) = result {
                log::warn!("Match {}: could not allow {}: {}", self.inner.match_id, participant.steam_id, e);
                failures.push((participant.steam_id.clone(), e.to_string()));
            }
        }
        if let Some((_, last)) = failures.last() {
            let last = last.clone();
            with_state(&self.inner.state, |s| s.last_error = Some(last));
        }
    }

    pub fn match_id(&self) -> &MatchId {
        &self.inner.match_id
    }

    pub fn phase(&self) -> ProvisioningPhase {
        with_state(&self.inner.state, |s| s.phase)
    }

    pub fn reservation_id(&self) -> Option<ReservationId> {
        with_state(&self.inner.state, |s| s.reservation_id)
    }

    pub fn snapshot(&self) -> MatchProvisioningState {
        with_state(&self.inner.state, |s| s.clone())
    }

    pub fn roster(&self) -> Roster {
        with_state(&self.inner.state, |s| s.roster.clone())
    }

    pub fn population_failures(&self) -> Vec<(SteamId, String)> {
        self.inner.population_failures.lock().expect("Mutex poisoned").clone()
    }

    /// Queued in call order. Awaiting is only needed to learn the outcome.
    pub fn allow_player(&self, steam_id: SteamId) -> impl Future<Output = Result<()>> + Send + 'static {
        self.inner.roster.submit(RosterOp::Allow(steam_id))
    }

    pub fn disallow_player(&self, steam_id: SteamId) -> impl Future<Output = Result<()>> + Send + 'static {
        self.inner.roster.submit(RosterOp::Disallow(steam_id))
    }

    pub async fn re_exec_config(&self, change_map: bool) -> Result<()> {
        self.ensure_live()?;
        let provisioning = self.inner.orchestrator.provisioning.clone();
        let args = ReExecConfig { match_id: self.inner.match_id.clone(), change_map };
        self.inner
            .orchestrator
            .config
            .retry
            .run("Pauling.ReExecConfig", || {
                let provisioning = provisioning.clone();
                let args = args.clone();
                async move { provisioning.re_exec_config(args).await }
            })
            .await
    }

    pub async fn say(&self, text: impl Into<String>) -> BestEffort {
        self.inner.orchestrator.provisioning.say(Say { match_id: self.inner.match_id.clone(), text: text.into() }).await
    }

    pub async fn exists(&self) -> Result<bool> {
        self.inner.orchestrator.provisioning.exists(Exists { match_id: self.inner.match_id.clone() }).await
    }

    fn ensure_live(&self) -> Result<()> {
        if self.phase() != ProvisioningPhase::Live {
            return Err(Error::MatchClosed(self.inner.match_id.to_string()));
        }
        Ok(())
    }

    /// Ends the match: best-effort `end` on the server, then the authoritative
    /// release of the reservation. The artifact is collected in the background.
    #[tracing::instrument(skip(self), fields(match_id = %self.inner.match_id))]
    pub async fn end(&self) -> std::result::Result<TeardownReport, ErrorReport> {
        let orchestrator = &self.inner.orchestrator;
        let state = &self.inner.state;
        let match_id = self.inner.match_id.clone();

        if let Err(error) = transition(state, ProvisioningPhase::Ending) {
            let (phase, reservation_id) = with_state(state, |s| (s.phase, s.reservation_id));
            return Err(ErrorReport { match_id, failed_phase: phase, reservation_id, error, compensation: Compensation::NotNeeded });
        }

        let end = orchestrator.provisioning.end(End { match_id: match_id.clone() }).await;
        if end.is_failed() {
            log::warn!("Match {}: end was not delivered; releasing the reservation anyway.", match_id);
        }

        let reservation_id = with_state(state, |s| s.reservation_id);
        if let Some(id) = reservation_id {
            let identity = &orchestrator.config.identity;
            let released = orchestrator.config.retry.run("reservation delete", || orchestrator.reservations.delete(id, identity)).await;
            if let Err(error) = released {
                with_state(state, |s| s.fail(&error));
                let compensation = Compensation::Failed(error.to_string());
                return Err(ErrorReport { match_id, failed_phase: ProvisioningPhase::Ending, reservation_id, error, compensation });
            }
        }

        if let Err(error) = transition(state, ProvisioningPhase::Ended) {
            let phase = with_state(state, |s| s.phase);
            return Err(ErrorReport { match_id, failed_phase: phase, reservation_id, error, compensation: Compensation::NotNeeded });
        }
        orchestrator.directory.remove_match(&match_id);

        let artifact = match (reservation_id, orchestrator.archive.clone()) {
            (Some(id), Some(archive)) => tokio::spawn(collect_artifact(
                orchestrator.reservations.clone(),
                archive,
                orchestrator.config.identity.clone(),
                id,
                match_id.to_string(),
                orchestrator.config.artifact_poll,
            )),
            _ => tokio::spawn(async { ArtifactOutcome::Skipped }),
        };

        Ok(TeardownReport { match_id, reservation_id, end, artifact })
    }
}

impl fmt::Debug for MatchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchSession").field("match_id", &self.inner.match_id).field("phase", &self.phase()).finish()
    }
}

async fn collect_artifact(
    reservations: Arc<dyn ReservationClient>,
    archive: Arc<dyn DemoArchive>,
    identity: SteamId,
    id: ReservationId,
    file_stem: String,
    poll: PollPolicy,
) -> ArtifactOutcome {
    let attempts = poll.attempts.max(1);
    for attempt in 1..=attempts {
        match reservations.artifact_url(id, &identity).await {
            Ok(Some(url)) => {
                return match archive.archive(&url, &file_stem).await {
                    Ok(Some(path)) => ArtifactOutcome::Archived(path),
                    Ok(None) => ArtifactOutcome::Unavailable,
                    Err(e) => {
                        log::warn!("Archiving {} for reservation {} failed: {}", url, id, e);
                        ArtifactOutcome::Failed(e.to_string())
                    }
                };
            }
            Ok(None) => log::debug!("Reservation {} has no artifact yet (check {}/{}).", id, attempt, attempts),
            Err(e) => log::warn!("Artifact lookup for reservation {} failed: {}", id, e),
        }
        if attempt < attempts {
            tokio::time::sleep(poll.interval).await;
        }
    }
    ArtifactOutcome::Unavailable
}
