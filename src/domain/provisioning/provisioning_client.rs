use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Settings;
use crate::domain::provisioning::command::{
    AllowPlayer, ControlCall, ControlReply, ControlRequest, DisallowPlayer, End, Exists, OperationClass, ReExecConfig, Say, SetupServer,
    VerifyInfo,
};
use crate::domain::rpc::connection::RpcConnection;
use crate::error::Result;

/// Result of a best-effort call. Never blocks the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestEffort {
    Delivered,
    /// The control service is disabled; nothing was sent.
    Skipped,
    Failed(String),
}

impl BestEffort {
    pub fn is_failed(&self) -> bool {
        matches!(self, BestEffort::Failed(_))
    }
}

/// Operations on the control service that manages a running game server.
#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    async fn setup_server(&self, args: SetupServer) -> Result<()>;

    async fn re_exec_config(&self, args: ReExecConfig) -> Result<()>;

    async fn verify_server_info(&self, args: VerifyInfo) -> Result<()>;

    async fn allow_player(&self, args: AllowPlayer) -> Result<()>;

    async fn disallow_player(&self, args: DisallowPlayer) -> Result<()>;

    async fn say(&self, args: Say) -> BestEffort;

    async fn end(&self, args: End) -> BestEffort;

    async fn exists(&self, args: Exists) -> Result<bool>;
}

/// Raw request/reply channel to the control service.
#[async_trait]
pub trait ControlTransport: Send + Sync {
    async fn call(&self, request: ControlRequest) -> Result<ControlReply>;
}

#[async_trait]
impl ControlTransport for RpcConnection<ControlRequest, ControlReply> {
    async fn call(&self, request: ControlRequest) -> Result<ControlReply> {
        self.round_trip(request).await
    }
}

/// Client that forwards every call over a live transport.
pub struct LiveProvisioningClient {
    transport: Arc<dyn ControlTransport>,
}

impl LiveProvisioningClient {
    pub fn new(transport: Arc<dyn ControlTransport>) -> Self {
        Self { transport }
    }

    /// Sends one call. Failures of best-effort operations are logged as warnings, all others as errors.
    async fn invoke<C: ControlCall>(&self, args: C) -> Result<C::Output> {
        let request: ControlRequest = args.into();
        let method = request.method();
        let class = request.class();
        log::debug!("Calling {} for match {:?}", method, request.match_id());

        let result = self.transport.call(request).await.and_then(C::output);
        if let Err(e) = &result {
            match class {
                OperationClass::Authoritative => log::error!("{} failed: {}", method, e),
                OperationClass::BestEffort => log::warn!("Best-effort call {} failed: {}", method, e),
            }
        }
        result
    }

    async fn best_effort<C: ControlCall<Output = ()>>(&self, args: C) -> BestEffort {
        match self.invoke(args).await {
            Ok(()) => BestEffort::Delivered,
            Err(e) => BestEffort::Failed(e.to_string()),
        }
    }
}

#[async_trait]
impl ProvisioningClient for LiveProvisioningClient {
    async fn setup_server(&self, args: SetupServer) -> Result<()> {
        log::info!("Setting up server {} for match {}.", args.server.host, args.match_id);
        self.invoke(args).await
    }

    async fn re_exec_config(&self, args: ReExecConfig) -> Result<()> {
        self.invoke(args).await
    }

    async fn verify_server_info(&self, args: VerifyInfo) -> Result<()> {
        self.invoke(args).await
    }

    async fn allow_player(&self, args: AllowPlayer) -> Result<()> {
        self.invoke(args).await
    }

    async fn disallow_player(&self, args: DisallowPlayer) -> Result<()> {
        self.invoke(args).await
    }

    async fn say(&self, args: Say) -> BestEffort {
        self.best_effort(args).await
    }

    async fn end(&self, args: End) -> BestEffort {
        self.best_effort(args).await
    }

    async fn exists(&self, args: Exists) -> Result<bool> {
        self.invoke(args).await
    }
}

/// Used when the control service is disabled. Succeeds without touching the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProvisioningClient;

#[async_trait]
impl ProvisioningClient for NoopProvisioningClient {
    async fn setup_server(&self, args: SetupServer) -> Result<()> {
        log::debug!("Control service disabled; skipping setup for match {}.", args.match_id);
        Ok(())
    }

    async fn re_exec_config(&self, _args: ReExecConfig) -> Result<()> {
        Ok(())
    }

    async fn verify_server_info(&self, _args: VerifyInfo) -> Result<()> {
        Ok(())
    }

    async fn allow_player(&self, _args: AllowPlayer) -> Result<()> {
        Ok(())
    }

    async fn disallow_player(&self, _args: DisallowPlayer) -> Result<()> {
        Ok(())
    }

    async fn say(&self, _args: Say) -> BestEffort {
        BestEffort::Skipped
    }

    async fn end(&self, _args: End) -> BestEffort {
        BestEffort::Skipped
    }

    // Nothing is ever set up, so nothing exists.
    async fn exists(&self, _args: Exists) -> Result<bool> {
        Ok(false)
    }
}

/// Picks the implementation once. A disabled service never looks at `transport`.
pub fn provisioning_client(disabled: bool, transport: Option<Arc<dyn ControlTransport>>) -> Arc<dyn ProvisioningClient> {
    match (disabled, transport) {
        (false, Some(transport)) => Arc::new(LiveProvisioningClient::new(transport)),
        (true, _) => {
            log::warn!("Control service is disabled. Provisioning calls will be skipped.");
            Arc::new(NoopProvisioningClient)
        }
        (false, None) => {
            log::warn!("No control-service transport available. Provisioning calls will be skipped.");
            Arc::new(NoopProvisioningClient)
        }
    }
}

/// Connects to the configured control service unless it is disabled.
///
/// # Returns
/// The client and, when live, the underlying connection so the caller can watch it.
pub async fn connect(settings: &Settings) -> Result<(Arc<dyn ProvisioningClient>, Option<RpcConnection<ControlRequest, ControlReply>>)> {
    if settings.pauling_disabled {
        return Ok((provisioning_client(true, None), None));
    }

    let connection = RpcConnection::<ControlRequest, ControlReply>::connect(&settings.pauling_addr(), settings.rpc_timeout).await?;
    let transport: Arc<dyn ControlTransport> = Arc::new(connection.clone());
    Ok((provisioning_client(false, Some(transport)), Some(connection)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::utils::id::{MatchId, SteamId};
    use crate::error::{Error, Rejection};
    use std::sync::Mutex;

    struct RecordingTransport {
        calls: Mutex<Vec<&'static str>>,
        fail_with: Option<fn() -> Error>,
    }

    #[async_trait]
    impl ControlTransport for RecordingTransport {
        async fn call(&self, request: ControlRequest) -> Result<ControlReply> {
            self.calls.lock().unwrap().push(request.method());
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            Ok(match request {
                ControlRequest::Exists(_) => ControlReply::Exists(true),
                _ => ControlReply::Empty,
            })
        }
    }

    fn transport(fail_with: Option<fn() -> Error>) -> Arc<RecordingTransport> {
        Arc::new(RecordingTransport { calls: Mutex::new(Vec::new()), fail_with })
    }

    #[tokio::test]
    async fn live_client_forwards_typed_calls() {
        let recorder = transport(None);
        let client = provisioning_client(false, Some(recorder.clone() as Arc<dyn ControlTransport>));
        let match_id = MatchId::new("7");

        client.allow_player(AllowPlayer { match_id: match_id.clone(), steam_id: SteamId::new("1") }).await.unwrap();
        assert!(client.exists(Exists { match_id: match_id.clone() }).await.unwrap());
        assert_eq!(client.say(Say { match_id, text: "hi".into() }).await, BestEffort::Delivered);

        assert_eq!(*recorder.calls.lock().unwrap(), vec!["Pauling.AllowPlayer", "Pauling.Exists", "Pauling.Say"]);
    }

    #[tokio::test]
    async fn best_effort_failures_are_swallowed_but_authoritative_ones_surface() {
        let recorder = transport(Some(|| Error::Rejected(Rejection::ControlService("server unreachable".into()))));
        let client = LiveProvisioningClient::new(recorder);
        let match_id = MatchId::new("7");

        assert!(client.end(End { match_id: match_id.clone() }).await.is_failed());
        let err = client.re_exec_config(ReExecConfig { match_id, change_map: true }).await.unwrap_err();
        assert_eq!(err.rejection(), Some(&Rejection::ControlService("server unreachable".into())));
    }

    #[tokio::test]
    async fn unexpected_reply_to_a_best_effort_call_is_reported_not_raised() {
        struct WrongReply;

        #[async_trait]
        impl ControlTransport for WrongReply {
            async fn call(&self, _request: ControlRequest) -> Result<ControlReply> {
                Ok(ControlReply::Exists(true))
            }
        }

        let client = LiveProvisioningClient::new(Arc::new(WrongReply));
        let match_id = MatchId::new("7");

        assert!(client.say(Say { match_id: match_id.clone(), text: "gl hf".into() }).await.is_failed());
        let err = client.allow_player(AllowPlayer { match_id, steam_id: SteamId::new("1") }).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn disabled_mode_never_touches_the_transport() {
        let recorder = transport(None);
        let client = provisioning_client(true, Some(recorder.clone() as Arc<dyn ControlTransport>));
        let match_id = MatchId::new("7");

        client.re_exec_config(ReExecConfig { match_id: match_id.clone(), change_map: false }).await.unwrap();
        assert_eq!(client.end(End { match_id: match_id.clone() }).await, BestEffort::Skipped);
        assert!(!client.exists(Exists { match_id }).await.unwrap());
        assert!(recorder.calls.lock().unwrap().is_empty());
    }
}
