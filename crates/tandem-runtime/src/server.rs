//! Server event loop
//!
//! [`Server::run`] owns the [`ServerRun`] and processes one [`ServerEvent`]
//! at a time: accepted and closed connections, reload requests and status
//! queries. Accept tasks and connection tasks only talk to it through the
//! event channel, so a reload never interleaves with connection bookkeeping.

use crate::error::{ReloadError, Result};
use crate::pool::EndpointId;
use crate::reload::{ReloadEngine, ReloadOutcome};
use crate::run::{RunOptions, ServerRun};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use tandem_config::ConfigSource;
use tandem_core::{Connection, ConnectionId, Directory};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Capacity of the event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events processed by the server loop
#[derive(Debug)]
pub enum ServerEvent {
    /// An endpoint accepted a connection
    Accepted {
        /// Endpoint that accepted
        endpoint: EndpointId,
        /// The connection
        stream: TcpStream,
        /// Remote address
        peer: SocketAddr,
    },

    /// A connection went away
    Closed(ConnectionId),

    /// Reload the configuration
    Reload {
        /// Source to reload from, the current one when `None`
        source: Option<ConfigSource>,
        /// Where to send the outcome
        reply: Option<oneshot::Sender<ReloadOutcome>>,
    },

    /// Report the server state
    Status(oneshot::Sender<ServerStatus>),

    /// Stop the server
    Shutdown,
}

/// Point-in-time view of a running server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    /// Port the server listens on
    pub port: Option<u16>,
    /// Number of listening endpoints
    pub endpoints: usize,
    /// Number of open connections
    pub connections: usize,
    /// Loaded plugins in load order
    pub plugins: Vec<String>,
    /// Reloads attempted so far
    pub reloads: u64,
}

/// Cloneable handle to a running [`Server`]
#[derive(Debug, Clone)]
pub struct ServerHandle {
    tx: mpsc::Sender<ServerEvent>,
}

impl ServerHandle {
    pub(crate) fn new(tx: mpsc::Sender<ServerEvent>) -> Self {
        Self { tx }
    }

    /// Reload from the server's configuration source and wait for the outcome
    pub async fn reload(&self) -> ReloadOutcome {
        self.send_reload(None).await
    }

    /// Reload from `source` and wait for the outcome
    ///
    /// On success `source` becomes the server's configuration source.
    pub async fn reload_from(&self, source: ConfigSource) -> ReloadOutcome {
        self.send_reload(Some(source)).await
    }

    /// Queue a reload without waiting for it
    ///
    /// Returns `false` if the server is gone or its queue is full.
    pub fn request_reload(&self) -> bool {
        self.tx
            .try_send(ServerEvent::Reload {
                source: None,
                reply: None,
            })
            .is_ok()
    }

    /// Current server state, `None` if the server stopped
    pub async fn status(&self) -> Option<ServerStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(ServerEvent::Status(reply)).await.ok()?;
        rx.await.ok()
    }

    /// Ask the server to stop
    pub async fn shutdown(&self) {
        let _ = self.tx.send(ServerEvent::Shutdown).await;
    }

    async fn send_reload(&self, source: Option<ConfigSource>) -> ReloadOutcome {
        let stopped = || ReloadError::internal("the server is not running");
        let (reply, rx) = oneshot::channel();

        self.tx
            .send(ServerEvent::Reload {
                source,
                reply: Some(reply),
            })
            .await
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }
}

/// The server event loop
#[derive(Debug)]
pub struct Server<D: Directory> {
    run: ServerRun<D>,
    source: ConfigSource,
    engine: ReloadEngine,
    tx: mpsc::Sender<ServerEvent>,
    rx: mpsc::Receiver<ServerEvent>,
    accept_tasks: HashMap<EndpointId, CancellationToken>,
    connections: HashMap<ConnectionId, CancellationToken>,
    next_connection: u64,
    shutdown: CancellationToken,
}

impl<D: Directory + 'static> Server<D> {
    /// Start a server from `source`
    pub fn start(source: ConfigSource, directory: D, options: RunOptions) -> Result<Self> {
        let run = ServerRun::start(&source, directory, options)?;
        Ok(Self::new(run, source))
    }

    /// Drive an already started run
    ///
    /// `source` is what reloads without an explicit source read from.
    pub fn new(run: ServerRun<D>, source: ConfigSource) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            run,
            source,
            engine: ReloadEngine::new(),
            tx,
            rx,
            accept_tasks: HashMap::new(),
            connections: HashMap::new(),
            next_connection: 1,
            shutdown: CancellationToken::new(),
        }
    }

    /// Handle for reloads, status queries and shutdown
    pub fn handle(&self) -> ServerHandle {
        ServerHandle::new(self.tx.clone())
    }

    /// The server state
    pub fn server_run(&self) -> &ServerRun<D> {
        &self.run
    }

    /// Process events until shutdown
    ///
    /// SIGHUP triggers a reload from the configuration source.
    pub async fn run(mut self) {
        self.sync_accept_tasks();
        let mut hangup = Hangup::new();

        info!(port = ?self.run.local_port(), "Server running");

        loop {
            tokio::select! {
                event = self.rx.recv() => {
                    let Some(event) = event else { break };
                    if !self.handle_event(event) {
                        break;
                    }
                }
                () = hangup.recv() => {
                    info!("Received SIGHUP");
                    let _ = self.reload(None);
                }
            }
        }

        self.shutdown.cancel();
        self.run.shutdown();
    }

    fn handle_event(&mut self, event: ServerEvent) -> bool {
        match event {
            ServerEvent::Accepted {
                endpoint,
                stream,
                peer,
            } => self.accept(endpoint, stream, peer),
            ServerEvent::Closed(id) => {
                self.connections.remove(&id);
                if self.run.remove_connection(id).is_some() {
                    debug!(connection = %id, "Connection closed");
                }
            }
            ServerEvent::Reload { source, reply } => {
                let outcome = self.reload(source);
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            ServerEvent::Status(reply) => {
                let _ = reply.send(self.status());
            }
            ServerEvent::Shutdown => {
                info!("Shutdown requested");
                return false;
            }
        }
        true
    }

    fn reload(&mut self, source: Option<ConfigSource>) -> ReloadOutcome {
        let outcome = match &source {
            Some(source) => self.run.reload(&self.engine, source),
            None => self.run.reload(&self.engine, &self.source),
        };

        if outcome.is_ok() {
            if let Some(source) = source {
                self.source = source;
            }
            self.sync_accept_tasks();
        }
        outcome
    }

    fn status(&self) -> ServerStatus {
        ServerStatus {
            port: self.run.local_port(),
            endpoints: self.run.pool().len(),
            connections: self.run.directory().connections().len(),
            plugins: self
                .run
                .registry()
                .active_plugins()
                .into_iter()
                .map(str::to_string)
                .collect(),
            reloads: self.engine.generation(),
        }
    }

    fn accept(&mut self, endpoint: EndpointId, stream: TcpStream, peer: SocketAddr) {
        let Some(policy) = self
            .run
            .pool()
            .endpoint(endpoint)
            .map(|e| e.security_policy())
        else {
            debug!(%endpoint, %peer, "Dropping connection accepted by a closed endpoint");
            return;
        };

        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;

        if let Err(e) = self.run.add_connection(Connection::new(id, peer)) {
            error!(connection = %id, error = %e, "Failed to register connection");
            return;
        }
        debug!(connection = %id, %peer, %endpoint, %policy, "Connection accepted");

        let token = self.shutdown.child_token();
        tokio::spawn(serve_connection(id, stream, token.clone(), self.tx.clone()));
        self.connections.insert(id, token);
    }

    /// Stop accepting on endpoints that left the pool, start on new ones
    fn sync_accept_tasks(&mut self) {
        let live: HashSet<EndpointId> = self.run.pool().endpoints().iter().map(|e| e.id()).collect();

        self.accept_tasks.retain(|id, token| {
            let keep = live.contains(id);
            if !keep {
                token.cancel();
            }
            keep
        });

        let new: Vec<_> = self
            .run
            .pool()
            .endpoints()
            .iter()
            .filter(|e| !self.accept_tasks.contains_key(&e.id()))
            .map(|e| (e.id(), e.listener().accept_handle()))
            .collect();

        for (id, handle) in new {
            let Some(handle) = handle else {
                debug!(endpoint = %id, "Endpoint has no socket to accept on");
                continue;
            };
            let listener = match TcpListener::from_std(handle) {
                Ok(listener) => listener,
                Err(e) => {
                    warn!(endpoint = %id, error = %e, "Failed to register listener with the reactor");
                    continue;
                }
            };

            let token = self.shutdown.child_token();
            tokio::spawn(accept_loop(id, listener, token.clone(), self.tx.clone()));
            self.accept_tasks.insert(id, token);
        }
    }
}

async fn accept_loop(
    endpoint: EndpointId,
    listener: TcpListener,
    token: CancellationToken,
    tx: mpsc::Sender<ServerEvent>,
) {
    debug!(%endpoint, "Accepting connections");
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let event = ServerEvent::Accepted { endpoint, stream, peer };
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(%endpoint, error = %e, "Accept failed"),
            },
        }
    }
    debug!(%endpoint, "Stopped accepting connections");
}

/// Hold a connection until the peer or the server closes it
///
/// The session protocol runs on top of this; here the stream is only
/// drained so a closed peer is noticed.
async fn serve_connection(
    id: ConnectionId,
    mut stream: TcpStream,
    token: CancellationToken,
    tx: mpsc::Sender<ServerEvent>,
) {
    let mut buf = [0u8; 4096];
    loop {
        tokio::select! {
            () = token.cancelled() => return,
            read = stream.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => trace!(connection = %id, bytes = n, "Received data"),
                Err(e) => {
                    debug!(connection = %id, error = %e, "Connection error");
                    break;
                }
            },
        }
    }
    let _ = tx.send(ServerEvent::Closed(id)).await;
}

/// SIGHUP listener; never fires where there is no SIGHUP
struct Hangup {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl Hangup {
    fn new() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let signal = match signal(SignalKind::hangup()) {
                Ok(signal) => Some(signal),
                Err(e) => {
                    warn!(error = %e, "Cannot listen for SIGHUP, reload on signal disabled");
                    None
                }
            };
            Self { signal }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        if let Some(signal) = &mut self.signal {
            if signal.recv().await.is_some() {
                return;
            }
            self.signal = None;
        }
        std::future::pending::<()>().await;
    }
}
