use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, RwLock, mpsc};

use actix::prelude::*;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedRead;

use crate::domain::rpc::codec::RpcCodec;
use crate::domain::rpc::protocol::RpcMessage;
use crate::error::{Error, Result};

/// Outbound half of one application connection. The dispatcher and the
/// synchronization manager write commands through it; implementations
/// translate a failed write into a channel error.
pub trait MessageSink: Send + Sync + fmt::Debug {
    fn send(&self, msg: RpcMessage) -> Result<()>;
}

/// The connection map: application pid to its outbound sink. Guarded by
/// its own lock, taken strictly after the session-map lock.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<i32, Arc<dyn MessageSink>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Registers the outbound sink of a newly paired application.
    pub fn pair(&self, pid: i32, sink: Arc<dyn MessageSink>) {
        self.inner.write().expect("connection registry lock poisoned").insert(pid, sink);
        log::info!("Transport: paired application {}", pid);
    }

    pub fn unpair(&self, pid: i32) {
        self.inner.write().expect("connection registry lock poisoned").remove(&pid);
        log::info!("Transport: unpaired application {}", pid);
    }

    pub fn sink(&self, pid: i32) -> Result<Arc<dyn MessageSink>> {
        self.inner
            .read()
            .expect("connection registry lock poisoned")
            .get(&pid)
            .cloned()
            .ok_or_else(|| Error::RpcChannel(format!("application {} not connected", pid)))
    }

    pub fn connected(&self, pid: i32) -> bool {
        self.inner.read().expect("connection registry lock poisoned").contains_key(&pid)
    }
}

/// In-process sink backed by a channel; the transport used by the test
/// runtime-library mocks.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<RpcMessage>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<RpcMessage>) -> Self {
        Self { tx }
    }
}

impl MessageSink for ChannelSink {
    fn send(&self, msg: RpcMessage) -> Result<()> {
        self.tx.send(msg).map_err(|_| Error::RpcChannel("peer channel closed".to_string()))
    }
}

/// One framed TCP connection to an application runtime.
///
/// Acts as a proxy: records read from the socket are forwarded to the
/// dispatcher, commands sent to this actor are written to the socket. On
/// the pairing record the session registers itself in the connection map.
pub struct RpcSession {
    dispatcher: mpsc::Sender<RpcMessage>,
    connections: ConnectionRegistry,
    framed_write: actix::io::FramedWrite<RpcMessage, tokio::io::WriteHalf<TcpStream>, RpcCodec>,
    peer: Option<i32>,
}

impl RpcSession {
    pub fn start(stream: TcpStream, dispatcher: mpsc::Sender<RpcMessage>, connections: ConnectionRegistry) -> Addr<Self> {
        let (read_half, write_half) = tokio::io::split(stream);
        Self::create(|ctx| {
            ctx.add_stream(FramedRead::new(read_half, RpcCodec::new()));
            Self { dispatcher, connections, framed_write: actix::io::FramedWrite::new(write_half, RpcCodec::new(), ctx), peer: None }
        })
    }
}

impl Actor for RpcSession {
    type Context = Context<Self>;

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(pid) = self.peer.take() {
            self.connections.unpair(pid);
        }
    }
}

/// Command written out to the connected application.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Outbound(pub RpcMessage);

impl Handler<Outbound> for RpcSession {
    type Result = ();

    fn handle(&mut self, msg: Outbound, _ctx: &mut Self::Context) {
        self.framed_write.write(msg.0);
    }
}

impl StreamHandler<std::result::Result<RpcMessage, io::Error>> for RpcSession {
    fn handle(&mut self, msg: std::result::Result<RpcMessage, io::Error>, ctx: &mut Self::Context) {
        match msg {
            Ok(record) => {
                if let RpcMessage::AppPair { header, .. } = &record {
                    self.peer = Some(header.app.pid);
                    self.connections.pair(header.app.pid, Arc::new(SessionSink { addr: ctx.address() }));
                }
                if self.dispatcher.send(record).is_err() {
                    log::warn!("Transport: dispatcher gone, dropping session");
                    ctx.stop();
                }
            }
            Err(e) => {
                log::error!("Transport: codec error: {}", e);
                ctx.stop();
            }
        }
    }
}

impl actix::io::WriteHandler<io::Error> for RpcSession {}

/// Outbound sink writing through a session actor.
#[derive(Debug)]
struct SessionSink {
    addr: Addr<RpcSession>,
}

impl MessageSink for SessionSink {
    fn send(&self, msg: RpcMessage) -> Result<()> {
        if !self.addr.connected() {
            return Err(Error::RpcChannel("session actor stopped".to_string()));
        }
        self.addr.do_send(Outbound(msg));
        Ok(())
    }
}

/// Accept loop for the RPC endpoint, run inside a dedicated actix system
/// thread. Each accepted connection gets its own session actor.
pub fn spawn_rpc_server(bind_addr: String, dispatcher: mpsc::Sender<RpcMessage>, connections: ConnectionRegistry) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("rtrm-rpc".to_string())
        .spawn(move || {
            let system = actix::System::new();
            system.block_on(async move {
                let listener = match TcpListener::bind(&bind_addr).await {
                    Ok(l) => l,
                    Err(e) => {
                        log::error!("Transport: cannot bind '{}': {}", bind_addr, e);
                        return;
                    }
                };
                log::info!("Transport: listening on {}", bind_addr);
                loop {
                    match listener.accept().await {
                        Ok((stream, peer)) => {
                            log::debug!("Transport: connection from {}", peer);
                            RpcSession::start(stream, dispatcher.clone(), connections.clone());
                        }
                        Err(e) => {
                            log::warn!("Transport: accept failed: {}", e);
                        }
                    }
                }
            });
        })
        .expect("failed to spawn the RPC server thread")
}
