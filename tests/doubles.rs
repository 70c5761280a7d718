#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use match_provisioning::domain::archive::demo_archive::DemoArchive;
use match_provisioning::domain::provisioning::command::{
    AllowPlayer, ControlReply, ControlRequest, DisallowPlayer, End, Exists, ReExecConfig, Say, SetupServer, VerifyInfo,
};
use match_provisioning::domain::provisioning::provisioning_client::{BestEffort, ControlTransport, ProvisioningClient};
use match_provisioning::domain::reservation::reservation::{
    Reservation, ReservationDraft, ReservationId, ReservationStatus, ReservationWindow, ServerCandidates, ServerDescriptor, parse_time,
};
use match_provisioning::domain::reservation::reservation_client::ReservationClient;
use match_provisioning::domain::utils::id::SteamId;
use match_provisioning::error::{Error, Result};

pub fn window() -> ReservationWindow {
    ReservationWindow::new(parse_time("2025-01-01T10:00:00.000+00:00").unwrap(), parse_time("2025-01-01T11:00:00.000+00:00").unwrap()).unwrap()
}

pub fn draft() -> ReservationDraft {
    ReservationDraft {
        window: window(),
        server_id: 3,
        rcon_password: "rcon".into(),
        server_password: "pw".into(),
        first_map: Some("cp_process_final".into()),
        whitelist_id: None,
        server_config_id: None,
    }
}

pub fn requested_reservation() -> Reservation {
    Reservation {
        id: ReservationId(42),
        window: window(),
        status: ReservationStatus::Requested,
        ended: false,
        server_id: Some(3),
        server: Some(ServerDescriptor { server_id: Some(3), name: "Server #3".into(), host: "10.0.0.3:27015".into(), ..Default::default() }),
        secrets: None,
        artifact_url: None,
        errors: BTreeMap::new(),
    }
}

/// Reservation service double. Deleting a reservation marks it ended, like the real service.
pub struct FakeReservations {
    pub reservation: Reservation,
    pub create_error: Option<fn() -> Error>,
    pub status: Mutex<ReservationStatus>,
    pub artifact_url: Option<String>,
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    /// Transport failures returned by `delete` before it succeeds.
    pub delete_failures: AtomicU32,
}

impl FakeReservations {
    pub fn new() -> Self {
        Self {
            reservation: requested_reservation(),
            create_error: None,
            status: Mutex::new(ReservationStatus::Requested),
            artifact_url: Some("http://demos.example/42.zip".into()),
            create_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            delete_failures: AtomicU32::new(0),
        }
    }

    pub fn failing_create(create_error: fn() -> Error) -> Self {
        Self { create_error: Some(create_error), ..Self::new() }
    }

    pub fn deletes(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReservationClient for FakeReservations {
    async fn query_upcoming_window(&self, _identity: &SteamId) -> Result<ReservationWindow> {
        Ok(window())
    }

    async fn find_servers(&self, _window: &ReservationWindow, _identity: &SteamId) -> Result<ServerCandidates> {
        Ok(ServerCandidates::default())
    }

    async fn create(&self, _draft: &ReservationDraft, _identity: &SteamId) -> Result<Reservation> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        match self.create_error {
            Some(error) => Err(error()),
            None => Ok(self.reservation.clone()),
        }
    }

    async fn fetch(&self, id: ReservationId, _identity: &SteamId) -> Result<Reservation> {
        let status = *self.status.lock().unwrap();
        let ended = status == ReservationStatus::Ended;
        Ok(Reservation { id, status, artifact_url: if ended { self.artifact_url.clone() } else { None }, ..self.reservation.clone() })
    }

    async fn delete(&self, _id: ReservationId, _identity: &SteamId) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.delete_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.delete_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Transport("connection reset by peer".into()));
        }
        *self.status.lock().unwrap() = ReservationStatus::Ended;
        Ok(())
    }
}

/// Control service double that records every call in order.
pub struct FakeProvisioning {
    pub calls: Mutex<Vec<String>>,
    pub verify_error: Option<fn() -> Error>,
    pub setup_error: Option<fn() -> Error>,
    /// Number of leading `setup_server` calls that fail with `setup_error`.
    pub setup_failures: AtomicU32,
    pub allow_error_for: Option<SteamId>,
    pub end_result: BestEffort,
    /// Delay applied to the first roster call only.
    pub first_roster_delay: Duration,
}

impl FakeProvisioning {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            verify_error: None,
            setup_error: None,
            setup_failures: AtomicU32::new(0),
            allow_error_for: None,
            end_result: BestEffort::Delivered,
            first_roster_delay: Duration::ZERO,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn roster_delay(&self) {
        let first = !self.calls.lock().unwrap().iter().any(|c| c.starts_with("allow") || c.starts_with("disallow"));
        if first && !self.first_roster_delay.is_zero() {
            tokio::time::sleep(self.first_roster_delay).await;
        }
    }
}

#[async_trait]
impl ProvisioningClient for FakeProvisioning {
    async fn setup_server(&self, args: SetupServer) -> Result<()> {
        self.record(format!("setup {} on {}", args.match_id, args.server.host));
        if let Some(error) = self.setup_error {
            let remaining = self.setup_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.setup_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(error());
            }
        }
        Ok(())
    }

    async fn re_exec_config(&self, args: ReExecConfig) -> Result<()> {
        self.record(format!("reexec {} {}", args.match_id, args.change_map));
        Ok(())
    }

    async fn verify_server_info(&self, args: VerifyInfo) -> Result<()> {
        self.record(format!("verify {}", args.server.host));
        match self.verify_error {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }

    async fn allow_player(&self, args: AllowPlayer) -> Result<()> {
        self.roster_delay().await;
        self.record(format!("allow {}", args.steam_id));
        if self.allow_error_for.as_ref() == Some(&args.steam_id) {
            return Err(Error::Rejected(match_provisioning::error::Rejection::ControlService("player is banned".into())));
        }
        Ok(())
    }

    async fn disallow_player(&self, args: DisallowPlayer) -> Result<()> {
        self.roster_delay().await;
        self.record(format!("disallow {}", args.steam_id));
        Ok(())
    }

    async fn say(&self, args: Say) -> BestEffort {
        self.record(format!("say {}", args.text));
        BestEffort::Delivered
    }

    async fn end(&self, args: End) -> BestEffort {
        self.record(format!("end {}", args.match_id));
        self.end_result.clone()
    }

    async fn exists(&self, args: Exists) -> Result<bool> {
        self.record(format!("exists {}", args.match_id));
        Ok(true)
    }
}

/// Transport that only counts. Any call reaching it is a failure in disabled mode.
#[derive(Default)]
pub struct CountingTransport {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ControlTransport for CountingTransport {
    async fn call(&self, _request: ControlRequest) -> Result<ControlReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ControlReply::Empty)
    }
}

#[derive(Default)]
pub struct FakeArchive {
    pub archived: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl DemoArchive for FakeArchive {
    async fn fetch_artifact(&self, _url: &str) -> Result<Bytes> {
        Ok(Bytes::new())
    }

    async fn archive(&self, url: &str, file_stem: &str) -> Result<Option<PathBuf>> {
        self.archived.lock().unwrap().push((url.to_string(), file_stem.to_string()));
        Ok(Some(PathBuf::from(format!("demos/{}.dem", file_stem))))
    }
}
