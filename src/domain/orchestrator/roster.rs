use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

use crate::domain::facade::match_directory::MatchDirectory;
use crate::domain::orchestrator::state::{MatchProvisioningState, ProvisioningPhase};
use crate::domain::provisioning::command::{AllowPlayer, DisallowPlayer};
use crate::domain::provisioning::provisioning_client::ProvisioningClient;
use crate::domain::utils::id::{MatchId, SteamId};
use crate::domain::utils::retry::RetryPolicy;
use crate::error::{Error, Result};

/// Identities currently allowed on the match server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    allowed: BTreeSet<SteamId>,
}

impl Roster {
    pub fn contains(&self, steam_id: &SteamId) -> bool {
        self.allowed.contains(steam_id)
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SteamId> {
        self.allowed.iter()
    }

    pub fn apply(&mut self, op: &RosterOp) {
        match op {
            RosterOp::Allow(steam_id) => {
                self.allowed.insert(steam_id.clone());
            }
            RosterOp::Disallow(steam_id) => {
                self.allowed.remove(steam_id);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterOp {
    Allow(SteamId),
    Disallow(SteamId),
}

impl RosterOp {
    pub fn steam_id(&self) -> &SteamId {
        match self {
            RosterOp::Allow(steam_id) | RosterOp::Disallow(steam_id) => steam_id,
        }
    }
}

struct RosterCommand {
    op: RosterOp,
    reply_to: oneshot::Sender<Result<()>>,
}

/// Per-match FIFO for roster mutations.
///
/// Operations are queued in the order `submit` is called and applied one at a
/// time by a dedicated worker task, so the control service and the local
/// roster see them in issuance order no matter how many tasks submit.
#[derive(Clone)]
pub struct RosterSequencer {
    match_id: MatchId,
    tx: mpsc::UnboundedSender<RosterCommand>,
}

impl RosterSequencer {
    pub fn spawn(
        match_id: MatchId,
        provisioning: Arc<dyn ProvisioningClient>,
        directory: Arc<dyn MatchDirectory>,
        state: Arc<Mutex<MatchProvisioningState>>,
        retry: RetryPolicy,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = RosterWorker { match_id: match_id.clone(), provisioning, directory, state, retry };
        tokio::spawn(worker.run(rx));
        Self { match_id, tx }
    }

    /// Queues `op` immediately. The returned future resolves once the worker applied it.
    pub fn submit(&self, op: RosterOp) -> impl Future<Output = Result<()>> + Send + 'static {
        let (reply_tx, reply_rx) = oneshot::channel();
        let queued = self.tx.send(RosterCommand { op, reply_to: reply_tx }).is_ok();
        let match_id = self.match_id.clone();

        async move {
            if !queued {
                return Err(Error::MatchClosed(match_id.to_string()));
            }
            reply_rx.await.map_err(|_| Error::MatchClosed(match_id.to_string()))?
        }
    }
}

struct RosterWorker {
    match_id: MatchId,
    provisioning: Arc<dyn ProvisioningClient>,
    directory: Arc<dyn MatchDirectory>,
    state: Arc<Mutex<MatchProvisioningState>>,
    retry: RetryPolicy,
}

impl RosterWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<RosterCommand>) {
        while let Some(RosterCommand { op, reply_to }) = rx.recv().await {
            let result = self.apply(&op).await;
            if let Err(e) = &result {
                log::warn!("Match {}: roster operation {:?} failed: {}", self.match_id, op, e);
            }
            let _ = reply_to.send(result);
        }
        log::debug!("Roster worker for match {} stopped.", self.match_id);
    }

    async fn apply(&self, op: &RosterOp) -> Result<()> {
        let phase = self.state.lock().expect("Mutex poisoned").phase;
        if phase != ProvisioningPhase::Live {
            return Err(Error::MatchClosed(self.match_id.to_string()));
        }

        match op {
            RosterOp::Allow(steam_id) => {
                let args = AllowPlayer { match_id: self.match_id.clone(), steam_id: steam_id.clone() };
                self.retry
                    .run("Pauling.AllowPlayer", || {
                        let provisioning = self.provisioning.clone();
                        let args = args.clone();
                        async move { provisioning.allow_player(args).await }
                    })
                    .await?;
            }
            RosterOp::Disallow(steam_id) => {
                let args = DisallowPlayer { match_id: self.match_id.clone(), steam_id: steam_id.clone() };
                self.retry
                    .run("Pauling.DisallowPlayer", || {
                        let provisioning = self.provisioning.clone();
                        let args = args.clone();
                        async move { provisioning.disallow_player(args).await }
                    })
                    .await?;
            }
        }

        self.state.lock().expect("Mutex poisoned").roster.apply(op);
        let allowed = matches!(op, RosterOp::Allow(_));
        if let Err(e) = self.directory.set_allowed(&self.match_id, op.steam_id(), allowed) {
            log::warn!("Match {}: directory not updated for {}: {}", self.match_id, op.steam_id(), e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::facade::match_directory::InMemoryMatchDirectory;
    use crate::domain::match_format::MatchType;
    use crate::domain::provisioning::command::{End, Exists, ReExecConfig, Say, SetupServer, VerifyInfo};
    use crate::domain::provisioning::provisioning_client::BestEffort;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Records roster calls. The first call is slow so a naive dispatcher would reorder.
    #[derive(Default)]
    struct SlowFirstClient {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProvisioningClient for SlowFirstClient {
        async fn setup_server(&self, _args: SetupServer) -> Result<()> {
            Ok(())
        }
        async fn re_exec_config(&self, _args: ReExecConfig) -> Result<()> {
            Ok(())
        }
        async fn verify_server_info(&self, _args: VerifyInfo) -> Result<()> {
            Ok(())
        }
        async fn allow_player(&self, args: AllowPlayer) -> Result<()> {
            let first = self.calls.lock().unwrap().is_empty();
            if first {
                tokio::time::sleep(Duration::from_millis(30)).await;
            }
            self.calls.lock().unwrap().push(format!("allow {}", args.steam_id));
            Ok(())
        }
        async fn disallow_player(&self, args: DisallowPlayer) -> Result<()> {
            self.calls.lock().unwrap().push(format!("disallow {}", args.steam_id));
            Ok(())
        }
        async fn say(&self, _args: Say) -> BestEffort {
            BestEffort::Delivered
        }
        async fn end(&self, _args: End) -> BestEffort {
            BestEffort::Delivered
        }
        async fn exists(&self, _args: Exists) -> Result<bool> {
            Ok(true)
        }
    }

    fn live_state(match_id: &MatchId) -> Arc<Mutex<MatchProvisioningState>> {
        let mut state = MatchProvisioningState::new(match_id.clone());
        for phase in [ProvisioningPhase::Reserving, ProvisioningPhase::Reserved, ProvisioningPhase::Configuring, ProvisioningPhase::Live] {
            state.advance(phase).unwrap();
        }
        Arc::new(Mutex::new(state))
    }

    #[tokio::test]
    async fn operations_apply_in_issuance_order() {
        let match_id = MatchId::new("7");
        let player = SteamId::new("76561198000000001");
        let client = Arc::new(SlowFirstClient::default());
        let directory = Arc::new(InMemoryMatchDirectory::new());
        directory.register_match(&match_id, MatchType::Sixes);
        let state = live_state(&match_id);

        let sequencer = RosterSequencer::spawn(match_id.clone(), client.clone(), directory.clone(), state.clone(), RetryPolicy::once());
        let (a, b, c) = tokio::join!(
            sequencer.submit(RosterOp::Allow(player.clone())),
            sequencer.submit(RosterOp::Disallow(player.clone())),
            sequencer.submit(RosterOp::Allow(player.clone())),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        assert_eq!(*client.calls.lock().unwrap(), vec![format!("allow {}", player), format!("disallow {}", player), format!("allow {}", player)]);
        assert!(state.lock().unwrap().roster.contains(&player));
        assert!(directory.is_allowed(&match_id, &player));
    }

    #[tokio::test]
    async fn rejects_mutations_once_the_match_left_live() {
        let match_id = MatchId::new("7");
        let state = live_state(&match_id);
        state.lock().unwrap().advance(ProvisioningPhase::Ending).unwrap();

        let client = Arc::new(SlowFirstClient::default());
        let sequencer = RosterSequencer::spawn(match_id, client.clone(), Arc::new(InMemoryMatchDirectory::new()), state, RetryPolicy::once());

        let result = sequencer.submit(RosterOp::Allow(SteamId::new("1"))).await;
        assert!(matches!(result, Err(Error::MatchClosed(_))));
        assert!(client.calls.lock().unwrap().is_empty());
    }
}
