//! Peer sessions: one reader and one writer task per peer, typed request
//! tracking, and the `BlockSource` face the sync driver consumes.

use crate::rlpx::{FrameDecoder, FrameEncoder, HEADER_WIRE_LEN};
use crate::wire::{
    EthMessage, HeadersRequest, HeadersStart, P2pMessage, Status, BASE_PROTOCOL_OFFSET,
};
use crate::{NetError, NetResult, NodeId};
use alloy_primitives::B256;
use async_trait::async_trait;
use ember_driver::{BlockSource, SourceError};
use ember_primitives::{Block, BlockBody, Header};
use ember_rlp::{encode, Item};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// The default deadline for peer requests.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// The most headers a single request window asks for.
const HEADERS_WINDOW: u64 = 192;

/// Chain data the session serves to the remote side.
pub trait ChainView: Send + Sync + 'static {
    /// Headers satisfying a remote request, best effort.
    fn headers(&self, request: &HeadersRequest) -> Vec<Header>;
    /// Bodies for the requested hashes, omitting unknown blocks.
    fn bodies(&self, hashes: &[B256]) -> Vec<BlockBody>;
}

/// Events a session surfaces to the node.
#[derive(Debug)]
pub enum SessionEvent {
    /// The remote announced a new block.
    NewBlock {
        /// The announced block.
        block: Box<Block>,
        /// The remote's claimed total difficulty.
        total_difficulty: alloy_primitives::U256,
        /// Which peer sent it.
        from: NodeId,
    },
    /// The session ended.
    Closed(NodeId),
}

/// Commands accepted by a session's writer side.
#[derive(Debug)]
pub enum PeerCommand {
    /// Request a window of headers.
    GetHeaders {
        /// The request to send.
        request: HeadersRequest,
        /// Where to deliver the response.
        reply: oneshot::Sender<Vec<Header>>,
    },
    /// Request block bodies.
    GetBodies {
        /// Hashes to fetch.
        hashes: Vec<B256>,
        /// Where to deliver the response.
        reply: oneshot::Sender<Vec<BlockBody>>,
    },
    /// Fire-and-forget protocol message.
    Send(EthMessage),
    /// Tear the session down.
    Disconnect,
}

/// In-flight request bookkeeping. eth/63 has no request ids, so responses
/// resolve strictly first-in first-out.
#[derive(Debug, Default)]
struct Pending {
    headers: VecDeque<oneshot::Sender<Vec<Header>>>,
    bodies: VecDeque<oneshot::Sender<Vec<BlockBody>>>,
}

/// The caller-facing face of one live session.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    /// The remote node id.
    pub id: NodeId,
    /// The status the remote presented at session start.
    pub status: Status,
    commands: mpsc::Sender<PeerCommand>,
}

impl PeerHandle {
    /// Sends a fire-and-forget message.
    pub async fn send(&self, message: EthMessage) {
        let _ = self.commands.send(PeerCommand::Send(message)).await;
    }

    /// Asks the peer to close.
    pub async fn disconnect(&self) {
        let _ = self.commands.send(PeerCommand::Disconnect).await;
    }

    async fn request<T>(
        &self,
        command: PeerCommand,
        response: oneshot::Receiver<T>,
    ) -> Result<T, SourceError> {
        self.commands.send(command).await.map_err(|_| SourceError::PeerGone)?;
        match tokio::time::timeout(REQUEST_TIMEOUT, response).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(SourceError::PeerGone),
            Err(_) => Err(SourceError::Timeout),
        }
    }
}

#[async_trait]
impl BlockSource for PeerHandle {
    async fn request_headers(
        &self,
        start: u64,
        max: usize,
    ) -> Result<Vec<Header>, SourceError> {
        let (reply, response) = oneshot::channel();
        let request = HeadersRequest {
            start: HeadersStart::Number(start),
            max: (max as u64).min(HEADERS_WINDOW),
            skip: 0,
            reverse: false,
        };
        self.request(PeerCommand::GetHeaders { request, reply }, response).await
    }

    async fn request_bodies(
        &self,
        hashes: Vec<B256>,
    ) -> Result<Vec<BlockBody>, SourceError> {
        let (reply, response) = oneshot::channel();
        self.request(PeerCommand::GetBodies { hashes, reply }, response).await
    }
}

/// The live peer registry shared between the listener, the dialer, and sync.
#[derive(Debug, Clone, Default)]
pub struct PeerSet {
    peers: Arc<Mutex<HashMap<NodeId, PeerHandle>>>,
    count: Arc<AtomicUsize>,
}

impl PeerSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The live-session counter handle, shared with [NodeHandle].
    ///
    /// [NodeHandle]: ember_driver::NodeHandle
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.count.clone()
    }

    /// The number of live sessions.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// True when no session is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a session.
    pub fn insert(&self, handle: PeerHandle) {
        let mut peers = self.peers.lock().expect("peer set lock poisoned");
        peers.insert(handle.id, handle);
        self.count.store(peers.len(), Ordering::Relaxed);
    }

    /// Drops a session.
    pub fn remove(&self, id: &NodeId) {
        let mut peers = self.peers.lock().expect("peer set lock poisoned");
        peers.remove(id);
        self.count.store(peers.len(), Ordering::Relaxed);
    }

    /// The peer advertising the heaviest chain, the sync driver's target.
    pub fn best_peer(&self) -> Option<PeerHandle> {
        let peers = self.peers.lock().expect("peer set lock poisoned");
        peers
            .values()
            .max_by_key(|handle| handle.status.total_difficulty)
            .cloned()
    }
}

/// Wiring shared by both session tasks.
pub(crate) struct SessionParts {
    pub remote_id: NodeId,
    pub remote_status: Status,
    pub read_half: OwnedReadHalf,
    pub write_half: OwnedWriteHalf,
    pub encoder: FrameEncoder,
    pub decoder: FrameDecoder,
}

/// Spawns the reader and writer tasks for a completed handshake and returns
/// the handle. Dropping all handles eventually ends the session.
pub(crate) fn spawn_session(
    parts: SessionParts,
    chain: Arc<dyn ChainView>,
    peers: PeerSet,
    events: mpsc::Sender<SessionEvent>,
) -> PeerHandle {
    let (command_tx, command_rx) = mpsc::channel(64);
    let (outbound_tx, outbound_rx) = mpsc::channel::<Vec<u8>>(64);
    let pending = Arc::new(Mutex::new(Pending::default()));

    let handle = PeerHandle {
        id: parts.remote_id,
        status: parts.remote_status,
        commands: command_tx,
    };

    tokio::spawn(writer_task(
        parts.write_half,
        parts.encoder,
        command_rx,
        outbound_rx,
        pending.clone(),
    ));
    tokio::spawn(reader_task(
        parts.read_half,
        parts.decoder,
        parts.remote_id,
        chain,
        peers,
        events,
        outbound_tx,
        pending,
    ));
    handle
}

/// Serializes an eth message as frame data with its session-relative id.
fn eth_frame(message: &EthMessage) -> Vec<u8> {
    let mut frame = encode(&Item::from_u64(
        (BASE_PROTOCOL_OFFSET + message.id()).into(),
    ));
    frame.extend_from_slice(&message.payload());
    frame
}

/// The writer task: turns commands and reader-side replies into frames.
async fn writer_task(
    mut write_half: OwnedWriteHalf,
    mut encoder: FrameEncoder,
    mut commands: mpsc::Receiver<PeerCommand>,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    pending: Arc<Mutex<Pending>>,
) {
    loop {
        let frame_data = tokio::select! {
            command = commands.recv() => match command {
                Some(PeerCommand::GetHeaders { request, reply }) => {
                    pending.lock().expect("pending lock poisoned").headers.push_back(reply);
                    eth_frame(&EthMessage::GetBlockHeaders(request))
                }
                Some(PeerCommand::GetBodies { hashes, reply }) => {
                    pending.lock().expect("pending lock poisoned").bodies.push_back(reply);
                    eth_frame(&EthMessage::GetBlockBodies(hashes))
                }
                Some(PeerCommand::Send(message)) => eth_frame(&message),
                Some(PeerCommand::Disconnect) | None => {
                    let frame = P2pMessage::Disconnect(
                        crate::wire::DisconnectReason::Requested,
                    )
                    .to_frame();
                    let _ = write_half.write_all(&encoder.write_frame(&frame)).await;
                    break;
                }
            },
            reply = outbound.recv() => match reply {
                Some(frame) => frame,
                None => break,
            },
        };

        if write_half.write_all(&encoder.write_frame(&frame_data)).await.is_err() {
            break;
        }
    }
}

/// The reader task: decodes frames, answers the remote's requests, resolves
/// our pending ones, and surfaces announcements.
#[allow(clippy::too_many_arguments)]
async fn reader_task(
    mut read_half: OwnedReadHalf,
    mut decoder: FrameDecoder,
    remote_id: NodeId,
    chain: Arc<dyn ChainView>,
    peers: PeerSet,
    events: mpsc::Sender<SessionEvent>,
    outbound: mpsc::Sender<Vec<u8>>,
    pending: Arc<Mutex<Pending>>,
) {
    let result = read_loop(
        &mut read_half,
        &mut decoder,
        &chain,
        &events,
        &outbound,
        &pending,
        remote_id,
    )
    .await;
    if let Err(err) = result {
        debug!(target: "net::peer", peer = %remote_id, %err, "session ended");
    }

    // Fail everything in flight: receivers observe PeerGone.
    {
        let mut pending = pending.lock().expect("pending lock poisoned");
        pending.headers.clear();
        pending.bodies.clear();
    }
    peers.remove(&remote_id);
    let _ = events.send(SessionEvent::Closed(remote_id)).await;
}

async fn read_loop(
    read_half: &mut OwnedReadHalf,
    decoder: &mut FrameDecoder,
    chain: &Arc<dyn ChainView>,
    events: &mpsc::Sender<SessionEvent>,
    outbound: &mpsc::Sender<Vec<u8>>,
    pending: &Arc<Mutex<Pending>>,
    remote_id: NodeId,
) -> NetResult<()> {
    loop {
        let mut header = [0u8; HEADER_WIRE_LEN];
        read_half.read_exact(&mut header).await?;
        let body_len = decoder.read_header(&header)?;
        let mut body = vec![0u8; body_len];
        read_half.read_exact(&mut body).await?;
        let frame_data = decoder.read_body(&body)?;

        let (id, payload) = split_frame(&frame_data)?;
        if id < BASE_PROTOCOL_OFFSET {
            match P2pMessage::from_frame(id, payload)? {
                P2pMessage::Ping => {
                    let _ = outbound.send(P2pMessage::Pong.to_frame()).await;
                }
                P2pMessage::Pong => {}
                P2pMessage::Disconnect(reason) => {
                    return Err(NetError::Disconnected(reason as u8));
                }
                P2pMessage::Hello(_) => {
                    return Err(NetError::Protocol("hello after handshake"));
                }
            }
            continue;
        }

        match EthMessage::from_payload(id - BASE_PROTOCOL_OFFSET, payload)? {
            EthMessage::GetBlockHeaders(request) => {
                let headers = chain.headers(&request);
                let _ = outbound.send(eth_frame(&EthMessage::BlockHeaders(headers))).await;
            }
            EthMessage::GetBlockBodies(hashes) => {
                let bodies = chain.bodies(&hashes);
                let _ = outbound.send(eth_frame(&EthMessage::BlockBodies(bodies))).await;
            }
            EthMessage::BlockHeaders(headers) => {
                let reply = pending.lock().expect("pending lock poisoned").headers.pop_front();
                match reply {
                    Some(reply) => {
                        let _ = reply.send(headers);
                    }
                    None => trace!(target: "net::peer", "unsolicited headers"),
                }
            }
            EthMessage::BlockBodies(bodies) => {
                let reply = pending.lock().expect("pending lock poisoned").bodies.pop_front();
                match reply {
                    Some(reply) => {
                        let _ = reply.send(bodies);
                    }
                    None => trace!(target: "net::peer", "unsolicited bodies"),
                }
            }
            EthMessage::NewBlock { block, total_difficulty } => {
                let _ = events
                    .send(SessionEvent::NewBlock { block, total_difficulty, from: remote_id })
                    .await;
            }
            EthMessage::NewBlockHashes(hashes) => {
                trace!(
                    target: "net::peer",
                    count = hashes.len(),
                    "block hash announcement"
                );
            }
            EthMessage::Transactions(transactions) => {
                trace!(
                    target: "net::peer",
                    count = transactions.len(),
                    "transaction announcement"
                );
            }
            EthMessage::GetNodeData(_) => {
                // Served empty: state download is not offered.
                let _ = outbound.send(eth_frame(&EthMessage::NodeData(vec![]))).await;
            }
            EthMessage::GetReceipts(_) => {
                let _ = outbound.send(eth_frame(&EthMessage::Receipts(vec![]))).await;
            }
            EthMessage::Status(_) => {
                return Err(NetError::Protocol("status after session start"));
            }
            other => {
                warn!(target: "net::peer", id = other.id(), "unhandled message");
            }
        }
    }
}

/// Splits frame data into its message id and payload.
pub(crate) fn split_frame(frame_data: &[u8]) -> NetResult<(u8, &[u8])> {
    let &first = frame_data.first().ok_or(NetError::Protocol("empty frame"))?;
    // The id is a single RLP integer: zero encodes as 0x80.
    let id = match first {
        0x80 => 0,
        byte if byte < 0x80 => byte,
        _ => return Err(NetError::Protocol("oversized message id")),
    };
    Ok((id, &frame_data[1..]))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split_frame() {
        assert_eq!(split_frame(&[0x80, 0xC0]).unwrap(), (0x00, &[0xC0][..]));
        assert_eq!(split_frame(&[0x10, 0xC0]).unwrap(), (0x10, &[0xC0][..]));
        assert!(split_frame(&[]).is_err());
        assert!(split_frame(&[0x81, 0x00]).is_err());
    }

    #[test]
    fn test_eth_frame_offsets_id() {
        let frame = eth_frame(&EthMessage::GetBlockBodies(vec![]));
        // GetBlockBodies is 0x05; on the wire it rides at 0x15.
        assert_eq!(frame[0], 0x15);
    }
}
