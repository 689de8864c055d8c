//! State manager server.
//!
//! The server accepts a fixed number of clients, then hands every connection
//! to a single dispatcher. Each connection's read half becomes an ordered
//! stream of frames; the streams are merged and the dispatcher applies one
//! request at a time to the register, so every client observes a single
//! linear history of register operations.
//!
//! Responses leave through one writer task per connection, fed by a bounded
//! queue, so a client that stops reading cannot stall the dispatcher. A
//! client whose queue fills up is dropped.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::stream::{self, SelectAll, Stream, StreamExt};
use shared_types::{KetRegister, QuantumRegister, RegisterError};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::adapters::framing::{read_frame_async, write_frame_async};
use crate::domain::{MessageType, Request, ServerConfig, WireMessage};
use crate::error::{ManagerError, ProtocolError, Result};
use crate::metrics::DispatchMetrics;

const LISTEN_BACKLOG: u32 = 1024;

/// Responses queued per connection before the client counts as stalled.
const OUTBOUND_CAPACITY: usize = 64;

/// How long shutdown waits for queued responses to drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Index of an accepted connection, in accept order.
type ConnectionId = usize;

/// What a connection's read half produced.
enum Inbound {
    Frame(Vec<u8>),
    Closed,
    Failed(ProtocolError),
}

type InboundStream = Pin<Box<dyn Stream<Item = (ConnectionId, Inbound)> + Send>>;

/// Ordered frames from one connection. Ends after EOF or a read error.
fn inbound_frames(id: ConnectionId, reader: OwnedReadHalf) -> InboundStream {
    Box::pin(stream::unfold(Some(reader), move |state| async move {
        let mut reader = state?;
        match read_frame_async(&mut reader).await {
            Ok(Some(frame)) => Some(((id, Inbound::Frame(frame)), Some(reader))),
            Ok(None) => Some(((id, Inbound::Closed), None)),
            Err(e) => Some(((id, Inbound::Failed(e)), None)),
        }
    }))
}

/// Sending side of a connection's writer task.
struct Outbound {
    frames: mpsc::Sender<Vec<u8>>,
    task: JoinHandle<()>,
}

/// Write queued frames in order, then shut the write half down once the
/// queue is closed. Stops at the first failed write.
fn spawn_writer(id: ConnectionId, mut writer: OwnedWriteHalf) -> Outbound {
    let (frames, mut queue) = mpsc::channel::<Vec<u8>>(OUTBOUND_CAPACITY);
    let task = tokio::spawn(async move {
        while let Some(frame) = queue.recv().await {
            if let Err(e) = write_frame_async(&mut writer, &frame).await {
                warn!(connection = id, error = %e, "response write failed");
                return;
            }
        }
        if let Err(e) = writer.shutdown().await {
            debug!(connection = id, error = %e, "shutdown failed");
        }
    });
    Outbound { frames, task }
}

enum Flow {
    Continue,
    Terminate,
}

/// Quantum-state manager server.
pub struct StateManagerServer {
    config: ServerConfig,
    listener: TcpListener,
    register: KetRegister,
}

impl StateManagerServer {
    /// Validate `config` and start listening with `SO_REUSEADDR`.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let addr = config.socket_addr();
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;

        info!(
            addr = %listener.local_addr()?,
            client_num = config.client_num,
            "state manager listening"
        );

        Ok(Self {
            config,
            listener,
            register: KetRegister::new(),
        })
    }

    /// Replace the register, e.g. with a seeded one.
    pub fn with_register(mut self, register: KetRegister) -> Self {
        self.register = register;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accept `client_num` connections and serve them until TERMINATE or
    /// until every connection has closed.
    ///
    /// Timing is flushed on every exit path. A fatal error closes all
    /// connections before it is returned.
    pub async fn run(self) -> Result<DispatchMetrics> {
        let Self {
            config,
            listener,
            register,
        } = self;

        let mut connections = Vec::with_capacity(config.client_num);
        for id in 0..config.client_num {
            let (stream, peer) = listener.accept().await?;
            stream.set_nodelay(true)?;
            info!(connection = id, %peer, "client connected");
            connections.push(stream);
        }
        drop(listener);
        info!(clients = connections.len(), "all clients connected, dispatching");

        let mut dispatcher = Dispatcher::new(register, config.tick());
        for (id, stream) in connections.into_iter().enumerate() {
            let (reader, writer) = stream.into_split();
            dispatcher.add_connection(id, reader, writer);
        }

        let outcome = dispatcher.serve().await;
        dispatcher.close_all().await;

        if let Err(e) = &outcome {
            error!(error = %e, "state manager session failed");
        }
        if let Err(e) = dispatcher.metrics.flush(config.timing_log.as_deref()) {
            warn!(error = %e, "failed to write timing log");
        }

        outcome.map(|()| dispatcher.metrics)
    }
}

/// Single serialization point for the register.
struct Dispatcher {
    register: KetRegister,
    tick: Duration,
    inbound: SelectAll<InboundStream>,
    writers: HashMap<ConnectionId, Outbound>,
    /// Writer tasks of removed connections, still flushing.
    retired: Vec<JoinHandle<()>>,
    metrics: DispatchMetrics,
}

impl Dispatcher {
    fn new(register: KetRegister, tick: Duration) -> Self {
        Self {
            register,
            tick,
            inbound: SelectAll::new(),
            writers: HashMap::new(),
            retired: Vec::new(),
            metrics: DispatchMetrics::new(),
        }
    }

    fn add_connection(&mut self, id: ConnectionId, reader: OwnedReadHalf, writer: OwnedWriteHalf) {
        self.inbound.push(inbound_frames(id, reader));
        self.writers.insert(id, spawn_writer(id, writer));
    }

    /// Stop accepting requests from `id`. Responses already queued are still
    /// written. Returns false if the connection was already gone.
    fn remove_connection(&mut self, id: ConnectionId) -> bool {
        match self.writers.remove(&id) {
            Some(outbound) => {
                self.retired.push(outbound.task);
                true
            }
            None => false,
        }
    }

    async fn serve(&mut self) -> Result<()> {
        while !self.writers.is_empty() {
            let (id, inbound) = match tokio::time::timeout(self.tick, self.inbound.next()).await {
                Err(_) => {
                    debug!(active = self.writers.len(), "dispatcher idle");
                    continue;
                }
                Ok(None) => break,
                Ok(Some(event)) => event,
            };

            match inbound {
                Inbound::Frame(bytes) => {
                    // Frames after CLOSE are dropped.
                    if !self.writers.contains_key(&id) {
                        continue;
                    }
                    let request = Request::decode(&bytes)?;
                    if let Flow::Terminate = self.dispatch(id, request)? {
                        return Ok(());
                    }
                }
                Inbound::Closed => {
                    if self.remove_connection(id) {
                        info!(connection = id, "client disconnected");
                    }
                }
                Inbound::Failed(ProtocolError::Io(e)) => {
                    warn!(connection = id, error = %e, "connection read failed, dropping");
                    self.remove_connection(id);
                }
                Inbound::Failed(e) => return Err(e.into()),
            }
        }
        info!("no connections left");
        Ok(())
    }

    fn dispatch(&mut self, id: ConnectionId, request: Request) -> Result<Flow> {
        let message_type = request.message_type();
        let started = Instant::now();
        debug!(connection = id, %message_type, "dispatching");

        let register_err = |source: RegisterError| ManagerError::Register {
            message_type,
            source,
        };

        let flow = match request {
            Request::Close => {
                self.remove_connection(id);
                info!(connection = id, "client closed");
                return Ok(Flow::Continue);
            }
            Request::Terminate => {
                info!(connection = id, "terminate requested");
                Flow::Terminate
            }
            Request::Get { key } => {
                let state = self.register.get(key).map_err(register_err)?;
                self.respond(id, serde_json::to_vec(&state).map_err(ProtocolError::from)?);
                Flow::Continue
            }
            Request::Set { keys, amplitudes } => {
                self.register.set(&keys, &amplitudes).map_err(register_err)?;
                Flow::Continue
            }
            Request::Run {
                circuit, binding, ..
            } => {
                let results = self
                    .register
                    .run_circuit(&circuit, &binding)
                    .map_err(register_err)?;
                if !results.is_empty() {
                    self.respond(id, serde_json::to_vec(&results).map_err(ProtocolError::from)?);
                }
                Flow::Continue
            }
            Request::Remove { key } => {
                self.register.remove(key).map_err(register_err)?;
                Flow::Continue
            }
            Request::Connect => {
                let reply = WireMessage::new(MessageType::Connected).encode()?;
                self.respond(id, reply);
                Flow::Continue
            }
            Request::Connected => {
                return Err(ProtocolError::UnexpectedType(MessageType::Connected).into());
            }
        };

        self.metrics.record(message_type, started.elapsed());
        Ok(flow)
    }

    /// Queue a response. A full or closed queue drops the connection.
    fn respond(&mut self, id: ConnectionId, payload: Vec<u8>) {
        let Some(outbound) = self.writers.get(&id) else {
            return;
        };
        match outbound.frames.try_send(payload) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(connection = id, "client is not reading responses, dropping connection");
                self.remove_connection(id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection = id, "writer already stopped, dropping connection");
                self.remove_connection(id);
            }
        }
    }

    /// Close every queue and give the writer tasks a bounded time to flush;
    /// whatever is still blocked afterwards is aborted.
    async fn close_all(&mut self) {
        let ids: Vec<ConnectionId> = self.writers.keys().copied().collect();
        for id in ids {
            self.remove_connection(id);
        }
        self.inbound = SelectAll::new();

        let tasks = std::mem::take(&mut self.retired);
        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(DRAIN_TIMEOUT, join_all(tasks)).await.is_err() {
            warn!(writers = aborts.len(), "writers did not drain in time, aborting");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}
