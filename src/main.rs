use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use match_provisioning::config::Settings;
use match_provisioning::domain::archive::demo_archive::HttpDemoArchive;
use match_provisioning::domain::facade::facade::ProvisioningFacade;
use match_provisioning::domain::facade::facade_server::FacadeServer;
use match_provisioning::domain::facade::match_directory::{InMemoryMatchDirectory, MatchDirectory};
use match_provisioning::domain::orchestrator::orchestrator::{Orchestrator, OrchestratorConfig, ProvisionRequest};
use match_provisioning::domain::orchestrator::report::ArtifactOutcome;
use match_provisioning::domain::provisioning::command::{ControlReply, ControlRequest};
use match_provisioning::domain::provisioning::provisioning_client;
use match_provisioning::domain::reservation::reservation::{ReservationId, ReservationWindow, format_time, parse_time};
use match_provisioning::domain::reservation::reservation_client::ReservationClient;
use match_provisioning::domain::reservation::serveme_client::ServemeClient;
use match_provisioning::domain::rpc::connection::RpcConnection;
use match_provisioning::domain::utils::id::SteamId;
use match_provisioning::{load_match_plan, logger};

#[derive(Parser)]
#[command(name = "match-provisioning", version, about = "Reserves, configures and tears down game servers for scheduled matches")]
struct Cli {
    /// JSON settings file. Environment variables still take precedence.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the inbound facade and hold the control-service connection until Ctrl-C.
    Serve,
    /// Print the next reservable window.
    Window,
    /// Print the status of a reservation.
    Status { id: u64 },
    /// Run one match from a JSON plan, keep it live until Ctrl-C, then tear it down.
    Provision {
        #[arg(long)]
        plan: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    logger::init(&settings.log_dir);
    log::info!("Starting with the {:?} profile.", settings.profile);

    match cli.command {
        Command::Serve => serve(&settings).await,
        Command::Window => {
            let window = ServemeClient::from_settings(&settings)?.query_upcoming_window(&identity(&settings)).await?;
            println!("{} .. {}", format_time(&window.starts), format_time(&window.ends));
            Ok(())
        }
        Command::Status { id } => {
            let reservation = ServemeClient::from_settings(&settings)?.fetch(ReservationId(id), &identity(&settings)).await?;
            println!("reservation {}: {} (ended: {})", reservation.id, reservation.status, reservation.has_ended());
            if let Some(url) = reservation.artifact_url {
                println!("artifact: {}", url);
            }
            Ok(())
        }
        Command::Provision { plan } => provision(&settings, &plan).await,
    }
}

fn identity(settings: &Settings) -> SteamId {
    SteamId::new(settings.serveme_steam_uid.clone())
}

async fn start_facade(settings: &Settings, directory: Arc<dyn MatchDirectory>) -> Result<()> {
    let addr = format!("0.0.0.0:{}", settings.rpc_port);
    let server = FacadeServer::bind(&addr, ProvisioningFacade::new(directory)).await.with_context(|| format!("binding facade to {}", addr))?;
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            log::error!("Facade stopped: {}", e);
        }
    });
    Ok(())
}

/// Waits for Ctrl-C. A lost control-service connection is fatal; there is no reconnect.
async fn hold_until_shutdown(connection: Option<&RpcConnection<ControlRequest, ControlReply>>) -> Result<()> {
    let lost = async {
        match connection {
            Some(connection) => connection.closed().await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            log::info!("Shutdown requested.");
            Ok(())
        }
        _ = lost => bail!("connection to the control service was lost"),
    }
}

async fn serve(settings: &Settings) -> Result<()> {
    let directory: Arc<dyn MatchDirectory> = Arc::new(InMemoryMatchDirectory::new());
    let (_, connection) = provisioning_client::connect(settings).await.context("connecting to the control service")?;
    start_facade(settings, directory).await?;
    hold_until_shutdown(connection.as_ref()).await
}

async fn provision(settings: &Settings, plan_path: &Path) -> Result<()> {
    let plan = load_match_plan(plan_path)?;
    let identity = identity(settings);
    let reservations: Arc<dyn ReservationClient> = Arc::new(ServemeClient::from_settings(settings)?);

    let window = match (&plan.starts_at, &plan.ends_at) {
        (Some(starts), Some(ends)) => ReservationWindow::new(parse_time(starts)?, parse_time(ends)?)?,
        _ => reservations.query_upcoming_window(&identity).await?,
    };
    let request = ProvisionRequest::from_plan(plan, window)?;

    let (provisioning, connection) = provisioning_client::connect(settings).await.context("connecting to the control service")?;
    let directory: Arc<dyn MatchDirectory> = Arc::new(InMemoryMatchDirectory::new());
    start_facade(settings, directory.clone()).await?;

    let orchestrator = Orchestrator::new(reservations, provisioning, directory, OrchestratorConfig::new(identity))
        .with_archive(Arc::new(HttpDemoArchive::from_settings(settings)?));

    let session = orchestrator.spawn(request).await??;
    log::info!("Match {} is live on reservation {:?}.", session.match_id(), session.reservation_id());
    for (steam_id, reason) in session.population_failures() {
        log::warn!("{} was not allowed on the server: {}", steam_id, reason);
    }

    let shutdown = hold_until_shutdown(connection.as_ref()).await;

    let teardown = session.end().await?;
    log::info!("Match {} ended (end: {:?}).", teardown.match_id, teardown.end);
    match teardown.artifact.await? {
        ArtifactOutcome::Archived(path) => log::info!("Demo stored at {}", path.display()),
        other => log::info!("No demo stored: {:?}", other),
    }

    shutdown
}
