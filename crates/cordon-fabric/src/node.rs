//! The fabric node: accept loop, per-connection read loops, and the
//! synchronous-over-asynchronous request/response emulation.
//!
//! Each node runs one accept loop, one read loop and one writer task per
//! established connection, and any number of application tasks issuing
//! sends and requests. Shared state (connection registry, pending
//! correlation map) lives behind tokio locks; waits are timeout-bounded
//! and never block indefinitely.

use crate::connection::{ConnectionRegistry, LinkDirection, PeerLink};
use crate::dispatch::{HandlerRegistry, IntentHandler};
use crate::envelope::{CorrelationId, Envelope, EnvelopeKind, WireFrame};
use crate::reconnect::{ReconnectAction, ReconnectPolicy};
use cordon_core::{CordonError, CordonResult, FabricConfig, FabricTimeouts, NodeId, NodeIdentity, NodeRole};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch, Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Frames larger than this are rejected as malformed.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Intent of the courtesy notification sent to a dependent peer after it
/// reconnects following an unexpected drop.
pub const LINK_RESTORED_INTENT: &str = "link_restored";

type PendingMap = HashMap<CorrelationId, oneshot::Sender<Result<serde_json::Value, String>>>;

struct NodeInner {
    identity: NodeIdentity,
    timeouts: FabricTimeouts,
    peers: RwLock<HashMap<NodeId, NodeIdentity>>,
    registry: RwLock<ConnectionRegistry>,
    pending: Mutex<PendingMap>,
    handlers: RwLock<HandlerRegistry>,
    reconnect: ReconnectPolicy,
    shutdown: watch::Sender<bool>,
    local_addr: std::sync::Mutex<Option<SocketAddr>>,
}

/// A node in the messaging fabric. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct FabricNode {
    inner: Arc<NodeInner>,
}

impl FabricNode {
    /// Create a node for `identity` within the configured peer set.
    pub fn new(identity: NodeIdentity, config: &FabricConfig) -> Self {
        let peers = config
            .nodes
            .iter()
            .cloned()
            .map(|n| (n.id.clone(), n))
            .collect();
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(NodeInner {
                identity,
                timeouts: config.timeouts,
                peers: RwLock::new(peers),
                registry: RwLock::new(ConnectionRegistry::new()),
                pending: Mutex::new(HashMap::new()),
                handlers: RwLock::new(HandlerRegistry::new()),
                reconnect: ReconnectPolicy::new(),
                shutdown,
                local_addr: std::sync::Mutex::new(None),
            }),
        }
    }

    /// This node's identifier.
    pub fn id(&self) -> &NodeId {
        &self.inner.identity.id
    }

    /// This node's role.
    pub fn role(&self) -> NodeRole {
        self.inner.identity.role
    }

    /// The address the listener actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .inner
            .local_addr
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace or add a peer table entry. Used by tests to patch resolved
    /// ephemeral ports back into the table.
    pub async fn update_peer(&self, identity: NodeIdentity) {
        self.inner
            .peers
            .write()
            .await
            .insert(identity.id.clone(), identity);
    }

    /// The configured role of a peer, if present in the table.
    pub async fn role_of(&self, peer: &NodeId) -> Option<NodeRole> {
        self.inner.peers.read().await.get(peer).map(|n| n.role)
    }

    /// The configured identity of the node filling `role`.
    pub async fn peer_for_role(&self, role: NodeRole) -> Option<NodeIdentity> {
        self.inner
            .peers
            .read()
            .await
            .values()
            .find(|n| n.role == role && n.id != self.inner.identity.id)
            .cloned()
    }

    /// Register a handler for envelopes with `intent` sent by `role`.
    pub async fn register_handler(
        &self,
        role: NodeRole,
        intent: impl Into<String>,
        handler: Arc<dyn IntentHandler>,
    ) {
        self.inner
            .handlers
            .write()
            .await
            .register(role, intent, handler);
    }

    /// Whether `peer` is currently reachable through either direction.
    pub async fn is_reachable(&self, peer: &NodeId) -> bool {
        self.inner.registry.read().await.is_reachable(peer)
    }

    /// Bind the listener and spawn the accept loop. Returns the bound
    /// address (meaningful when the configured port is 0).
    pub async fn start(&self) -> CordonResult<SocketAddr> {
        let listener = TcpListener::bind(self.inner.identity.addr()).await?;
        let addr = listener.local_addr()?;
        {
            let mut slot = self
                .inner
                .local_addr
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *slot = Some(addr);
        }
        info!(node = %self.id(), role = %self.role(), %addr, "fabric node listening");

        let node = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer_addr)) => {
                            debug!(%peer_addr, "inbound connection");
                            let node = node.clone();
                            tokio::spawn(async move {
                                if let Err(e) = node.handle_inbound(stream).await {
                                    warn!(error = %e, "inbound handshake failed");
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                        }
                    },
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(addr)
    }

    /// Open an outbound link to `peer` if none exists. Idempotent: an
    /// existing outbound link is left untouched.
    pub async fn connect(&self, peer: &NodeId) -> CordonResult<()> {
        if self.inner.registry.read().await.has_outbound(peer) {
            return Ok(());
        }

        let target = self
            .inner
            .peers
            .read()
            .await
            .get(peer)
            .cloned()
            .ok_or_else(|| CordonError::UnknownPeer { peer: peer.clone() })?;

        let stream = TcpStream::connect(target.addr()).await?;
        let (mut read_half, mut write_half) = stream.into_split();

        write_frame(
            &mut write_half,
            &WireFrame::Hello {
                node_id: self.id().clone(),
                role: self.role(),
            },
        )
        .await?;

        let hello = timeout(self.inner.timeouts.connect_wait(), read_frame(&mut read_half))
            .await
            .map_err(|_| CordonError::ConnectionTimeout { peer: peer.clone() })??;

        let (node_id, role) = match hello {
            Some(WireFrame::Hello { node_id, role }) => (node_id, role),
            _ => return Err(CordonError::malformed("expected hello frame")),
        };
        if &node_id != peer {
            return Err(CordonError::malformed(format!(
                "peer announced unexpected id {node_id}"
            )));
        }

        self.finish_link(node_id, role, LinkDirection::Outbound, read_half, write_half)
            .await;
        Ok(())
    }

    /// If `peer` is not currently reachable, attempt a connect and block
    /// until the connection-established notification for that exact peer
    /// arrives or the wait bound elapses. Timeout is non-fatal at this
    /// layer; a subsequent send simply fails with `UnknownPeer`.
    pub async fn wait_for_connection(&self, peer: &NodeId) {
        // The waiter is registered under the same lock as the final
        // reachability check, so a concurrent establishment cannot slip
        // between check and wait, and an establishment for a different
        // peer never wakes this call.
        let rx = {
            let mut registry = self.inner.registry.write().await;
            if registry.is_reachable(peer) {
                return;
            }
            registry.add_waiter(peer.clone())
        };

        if let Err(e) = self.connect(peer).await {
            debug!(peer = %peer, error = %e, "connect attempt during wait failed");
        }

        if timeout(self.inner.timeouts.connect_wait(), rx).await.is_err() {
            debug!(peer = %peer, "wait_for_connection timed out");
        }
    }

    /// Fire-and-forget delivery of a notify envelope. No delivery
    /// acknowledgement is required for success.
    pub async fn send(
        &self,
        target: &NodeId,
        intent: impl Into<String>,
        payload: serde_json::Value,
    ) -> CordonResult<()> {
        let envelope = Envelope::notify(self.id().clone(), intent, payload);
        self.deliver(target, envelope).await
    }

    /// Send a request and block until the correlated response arrives or
    /// the request bound elapses.
    pub async fn request(
        &self,
        target: &NodeId,
        intent: impl Into<String>,
        payload: serde_json::Value,
    ) -> CordonResult<serde_json::Value> {
        let intent = intent.into();
        let envelope = Envelope::request(self.id().clone(), intent.clone(), payload);
        let correlation = envelope.correlation;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(correlation, tx);

        if let Err(e) = self.deliver(target, envelope).await {
            self.inner.pending.lock().await.remove(&correlation);
            return Err(e);
        }

        match timeout(self.inner.timeouts.request(), rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(CordonError::Remote(message)),
            // Sender dropped: node shut down while the request was in flight.
            Ok(Err(_)) => Err(CordonError::ConnectionTimeout {
                peer: target.clone(),
            }),
            Err(_) => {
                self.inner.pending.lock().await.remove(&correlation);
                Err(CordonError::MessageTimeout { intent })
            }
        }
    }

    /// Stop the listener, drop every link, and abandon outstanding
    /// requests. Blocked requesters observe `ConnectionTimeout`.
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown.send(true);
        self.inner.registry.write().await.clear();
        self.inner.pending.lock().await.clear();
        info!(node = %self.id(), "fabric node stopped");
    }

    async fn deliver(&self, target: &NodeId, envelope: Envelope) -> CordonResult<()> {
        let mut tx = {
            let registry = self.inner.registry.read().await;
            registry.resolve(target).map(|l| l.tx.clone())
        };

        if tx.is_none() {
            self.wait_for_connection(target).await;
            tx = {
                let registry = self.inner.registry.read().await;
                registry.resolve(target).map(|l| l.tx.clone())
            };
        }

        let Some(tx) = tx else {
            warn!(target = %target, intent = %envelope.intent, "target not found in inbound or outbound connections");
            return Err(CordonError::UnknownPeer {
                peer: target.clone(),
            });
        };

        tx.send(WireFrame::Envelope(envelope)).map_err(|_| {
            CordonError::UnknownPeer {
                peer: target.clone(),
            }
        })
    }

    async fn handle_inbound(&self, stream: TcpStream) -> CordonResult<()> {
        let (mut read_half, mut write_half) = stream.into_split();

        let hello = timeout(self.inner.timeouts.connect_wait(), read_frame(&mut read_half))
            .await
            .map_err(|_| CordonError::malformed("handshake timed out"))??;

        let (node_id, role) = match hello {
            Some(WireFrame::Hello { node_id, role }) => (node_id, role),
            _ => return Err(CordonError::malformed("expected hello frame")),
        };

        write_frame(
            &mut write_half,
            &WireFrame::Hello {
                node_id: self.id().clone(),
                role: self.role(),
            },
        )
        .await?;

        self.finish_link(node_id, role, LinkDirection::Inbound, read_half, write_half)
            .await;
        Ok(())
    }

    async fn finish_link(
        &self,
        peer: NodeId,
        role: NodeRole,
        direction: LinkDirection,
        read_half: OwnedReadHalf,
        write_half: OwnedWriteHalf,
    ) {
        let (tx, mut frames) = mpsc::unbounded_channel::<WireFrame>();

        {
            let mut registry = self.inner.registry.write().await;
            // Two concurrent dials can both pass the has_outbound check in
            // connect; the loser is dropped here, closing its socket.
            if direction == LinkDirection::Outbound && registry.has_outbound(&peer) {
                debug!(peer = %peer, "duplicate outbound link dropped");
                return;
            }
            registry.register(PeerLink {
                peer: peer.clone(),
                role,
                direction,
                tx: tx.clone(),
            });
        }

        // Writer task: owns the write half; preserves per-connection order.
        tokio::spawn(async move {
            let mut write_half = write_half;
            while let Some(frame) = frames.recv().await {
                if let Err(e) = write_frame(&mut write_half, &frame).await {
                    debug!(error = %e, "write failed, closing connection");
                    break;
                }
            }
            let _ = write_half.shutdown().await;
        });
        info!(local = %self.role(), peer = %role, direction = ?direction, "connected");

        // Courtesy signal for a dependent peer that dropped earlier.
        if self.inner.reconnect.take_notice(&peer).await {
            let notice = Envelope::notify(
                self.id().clone(),
                LINK_RESTORED_INTENT,
                serde_json::json!({ "peer": self.id().as_str() }),
            );
            let _ = tx.send(WireFrame::Envelope(notice));
        }

        let node = self.clone();
        tokio::spawn(async move {
            node.read_loop(peer, role, direction, read_half).await;
        });
    }

    // Boxed rather than `async fn` to break the async type cycle
    // connect -> finish_link -> read_loop -> connect.
    fn read_loop(
        &self,
        peer: NodeId,
        role: NodeRole,
        direction: LinkDirection,
        mut read_half: OwnedReadHalf,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
        let mut shutdown = self.inner.shutdown.subscribe();
        loop {
            tokio::select! {
                frame = read_frame(&mut read_half) => match frame {
                    Ok(Some(WireFrame::Envelope(envelope))) => {
                        self.route(envelope).await;
                    }
                    Ok(Some(WireFrame::Hello { .. })) => {
                        debug!(peer = %peer, "ignoring repeated hello");
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(peer = %peer, error = %e, "read failed");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }

        self.inner.registry.write().await.remove(&peer, direction);
        if *shutdown.borrow() {
            return;
        }
        info!(local = %self.role(), peer = %role, "disconnected");

        let still_reachable = self.inner.registry.read().await.is_reachable(&peer);
        match ReconnectPolicy::action_for(role) {
            ReconnectAction::Reconnect if !still_reachable => {
                // Single immediate attempt, no backoff.
                let node = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = node.connect(&peer).await {
                        warn!(peer = %peer, error = %e, "reconnect attempt failed");
                    }
                });
            }
            ReconnectAction::NotifyWhenBack if !still_reachable => {
                self.inner.reconnect.record_notice(peer).await;
            }
            _ => {}
        }
        })
    }

    async fn route(&self, envelope: Envelope) {
        if let Err(e) = envelope.validate() {
            warn!(error = %e, "dropping malformed envelope");
            return;
        }

        match envelope.kind {
            EnvelopeKind::Response | EnvelopeKind::Failure => {
                let entry = self
                    .inner
                    .pending
                    .lock()
                    .await
                    .remove(&envelope.correlation);
                match entry {
                    Some(tx) => {
                        let outcome = if envelope.kind == EnvelopeKind::Response {
                            Ok(envelope.payload)
                        } else {
                            let message = envelope
                                .payload
                                .get("message")
                                .and_then(|m| m.as_str())
                                .unwrap_or("unspecified remote failure")
                                .to_string();
                            Err(message)
                        };
                        let _ = tx.send(outcome);
                    }
                    None => {
                        debug!(correlation = %envelope.correlation, "stale response dropped");
                    }
                }
            }
            EnvelopeKind::Request | EnvelopeKind::Notify => {
                let Some(sender_role) = self.role_of(&envelope.sender).await else {
                    warn!(sender = %envelope.sender, "message from unknown sender role dropped");
                    return;
                };
                let handler = self
                    .inner
                    .handlers
                    .read()
                    .await
                    .lookup(sender_role, &envelope.intent);
                let Some(handler) = handler else {
                    debug!(
                        sender_role = %sender_role,
                        intent = %envelope.intent,
                        "no handler registered, dropping"
                    );
                    return;
                };

                let node = self.clone();
                tokio::spawn(async move {
                    let is_request = envelope.kind == EnvelopeKind::Request;
                    let sender = envelope.sender.clone();
                    let reply = match handler.handle(&node, envelope.clone()).await {
                        Ok(Some(value)) => {
                            is_request.then(|| Envelope::response_to(&envelope, node.id().clone(), value))
                        }
                        Ok(None) => is_request
                            .then(|| Envelope::response_to(&envelope, node.id().clone(), serde_json::Value::Null)),
                        Err(e) => {
                            warn!(intent = %envelope.intent, error = %e, "handler failed");
                            is_request
                                .then(|| Envelope::failure_to(&envelope, node.id().clone(), e.to_string()))
                        }
                    };
                    if let Some(reply) = reply {
                        if let Err(e) = node.deliver(&sender, reply).await {
                            warn!(peer = %sender, error = %e, "failed to deliver reply");
                        }
                    }
                });
            }
        }
    }
}

/// Write one length-prefixed JSON frame.
async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &WireFrame) -> CordonResult<()> {
    let bytes =
        serde_json::to_vec(frame).map_err(|e| CordonError::serialization(e.to_string()))?;
    writer.write_all(&(bytes.len() as u32).to_be_bytes()).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed JSON frame. Returns `None` on clean EOF.
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> CordonResult<Option<WireFrame>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(CordonError::malformed(format!("frame of {len} bytes exceeds limit")));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    let frame = serde_json::from_slice(&buf)
        .map_err(|e| CordonError::malformed(format!("undecodable frame: {e}")))?;
    Ok(Some(frame))
}
