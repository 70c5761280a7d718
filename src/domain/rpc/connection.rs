use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::domain::rpc::codec::RpcCodec;
use crate::domain::rpc::envelope::{Envelope, Outcome};
use crate::error::{Error, Rejection, Result};

const QUEUE_DEPTH: usize = 256;

struct PendingCall<Req, Rep> {
    request: Req,
    reply_to: oneshot::Sender<Result<Rep>>,
}

/// Client side of one long-lived RPC connection.
///
/// A single connection task owns the socket. Callers hand it requests through a
/// queue; it tags each with a fresh request id, writes it, and routes every
/// reply back to the caller that is waiting on that id. Any number of tasks can
/// call concurrently without seeing each other's replies, and a slow call only
/// holds up its own caller.
///
/// Once the socket is gone every pending and future call fails with
/// `Error::ConnectionLost`. There is no reconnect.
#[derive(Debug, Clone)]
pub struct RpcConnection<Req, Rep> {
    peer: String,
    tx: mpsc::Sender<PendingCall<Req, Rep>>,
    timeout: Duration,
}

impl<Req, Rep> RpcConnection<Req, Rep>
where
    Req: Serialize + Debug + Send + 'static,
    Rep: DeserializeOwned + Send + 'static,
{
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        log::debug!("Connecting to RPC peer {}", addr);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Transport(format!("connecting to {} timed out", addr)))?
            .map_err(|e| Error::Transport(format!("failed to connect to {}: {}", addr, e)))?;
        stream.set_nodelay(true)?;
        log::info!("Connected to RPC peer {}", addr);
        Ok(Self::from_stream(stream, addr, timeout))
    }

    pub fn from_stream<S>(stream: S, peer: &str, timeout: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        tokio::spawn(run_connection_loop::<S, Req, Rep>(stream, rx, peer.to_string()));
        Self { peer: peer.to_string(), tx, timeout }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the connection task has stopped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// One request, one reply. A timeout counts as a transport failure.
    pub async fn round_trip(&self, request: Req) -> Result<Rep> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(PendingCall { request, reply_to: reply_tx }).await.map_err(|_| Error::ConnectionLost)?;

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Err(_) => Err(Error::Transport(format!("call to {} timed out after {:?}", self.peer, self.timeout))),
            Ok(Err(_)) => Err(Error::ConnectionLost),
            Ok(Ok(result)) => result,
        }
    }
}

type PendingReplies<Rep> = Mutex<HashMap<u64, oneshot::Sender<Result<Rep>>>>;

async fn run_connection_loop<S, Req, Rep>(stream: S, rx: mpsc::Receiver<PendingCall<Req, Rep>>, peer: String)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    Req: Serialize + Send + 'static,
    Rep: DeserializeOwned + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let pending: PendingReplies<Rep> = Mutex::new(HashMap::new());

    // Reads and writes progress independently.
    tokio::select! {
        _ = write_calls(write_half, rx, &pending, &peer) => {}
        _ = read_replies(read_half, &pending, &peer) => {}
    }

    for (_, reply_to) in pending.lock().expect("Mutex poisoned").drain() {
        let _ = reply_to.send(Err(Error::ConnectionLost));
    }
}

/// Tags each queued call with a fresh request id and writes it. Returns when the socket
/// fails or every handle is gone.
async fn write_calls<W, Req, Rep>(write_half: W, mut rx: mpsc::Receiver<PendingCall<Req, Rep>>, pending: &PendingReplies<Rep>, peer: &str)
where
    W: AsyncWrite + Unpin,
    Req: Serialize,
{
    let mut writer = FramedWrite::new(write_half, RpcCodec::<Envelope<Req>, ()>::new());
    let mut next_id: u64 = 0;

    while let Some(PendingCall { request, reply_to }) = rx.recv().await {
        next_id += 1;
        {
            let mut pending = pending.lock().expect("Mutex poisoned");
            // Callers that timed out dropped their receiver.
            pending.retain(|_, reply_to| !reply_to.is_closed());
            pending.insert(next_id, reply_to);
        }

        if let Err(e) = writer.send(Envelope { request_id: next_id, body: request }).await {
            log::error!("Failed to write to RPC peer {}: {}", peer, e);
            let failed = pending.lock().expect("Mutex poisoned").remove(&next_id);
            if let Some(reply_to) = failed {
                let _ = reply_to.send(Err(Error::ConnectionLost));
            }
            return;
        }
    }
    log::debug!("All handles to RPC peer {} dropped. Closing connection.", peer);
}

/// Routes every reply to the caller waiting on its request id.
async fn read_replies<R, Rep>(read_half: R, pending: &PendingReplies<Rep>, peer: &str)
where
    R: AsyncRead + Unpin,
    Rep: DeserializeOwned,
{
    let mut reader = FramedRead::new(read_half, RpcCodec::<(), Envelope<Outcome<Rep>>>::new());

    loop {
        match reader.next().await {
            Some(Ok(Envelope { request_id, body })) => {
                let waiting = pending.lock().expect("Mutex poisoned").remove(&request_id);
                match waiting {
                    Some(reply_to) => {
                        let result = match body {
                            Outcome::Ok(reply) => Ok(reply),
                            Outcome::Fault(message) => Err(Error::Rejected(Rejection::ControlService(message))),
                        };
                        let _ = reply_to.send(result);
                    }
                    None => log::warn!("Dropping reply to unknown or expired request {} from {}.", request_id, peer),
                }
            }
            Some(Err(e)) => {
                log::error!("Codec error on connection to {}: {}", peer, e);
                return;
            }
            None => {
                log::error!("Connection to RPC peer {} closed by remote.", peer);
                return;
            }
        }
    }
}
