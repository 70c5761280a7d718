use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::domain::facade::facade::{FacadeReply, FacadeRequest, ProvisioningFacade};
use crate::domain::rpc::codec::RpcCodec;
use crate::domain::rpc::envelope::{Envelope, Outcome};
use crate::error::Result;

pub type FacadeServerCodec = RpcCodec<Envelope<Outcome<FacadeReply>>, Envelope<FacadeRequest>>;
pub type FacadeClientCodec = RpcCodec<Envelope<FacadeRequest>, Envelope<Outcome<FacadeReply>>>;

/// Inbound RPC listener. Every accepted connection gets its own session task.
pub struct FacadeServer {
    listener: TcpListener,
    facade: ProvisioningFacade,
}

impl FacadeServer {
    pub async fn bind(addr: &str, facade: ProvisioningFacade) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        log::info!("Facade listening on {}", listener.local_addr()?);
        Ok(Self { listener, facade })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the task is dropped.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            log::debug!("Facade accepted connection from {}", peer);
            let facade = self.facade.clone();
            tokio::spawn(async move {
                serve_session(stream, peer, facade).await;
            });
        }
    }
}

async fn serve_session(stream: TcpStream, peer: SocketAddr, facade: ProvisioningFacade) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, FacadeServerCodec::new());
    let mut writer = FramedWrite::new(write_half, FacadeServerCodec::new());

    while let Some(frame) = reader.next().await {
        match frame {
            Ok(Envelope { request_id, body }) => {
                log::trace!("{} from {}", body.method(), peer);
                let reply = facade.handle(body);
                if let Err(e) = writer.send(Envelope { request_id, body: reply }).await {
                    log::warn!("Failed to answer {}: {}", peer, e);
                    break;
                }
            }
            Err(e) => {
                log::error!("Codec error: {}", e);
                break;
            }
        }
    }
    log::debug!("Facade session with {} closed", peer);
}
