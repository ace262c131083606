//! Session establishment: dialing, accepting, and the hello/status gate.

use crate::peer::{spawn_session, ChainView, PeerHandle, PeerSet, SessionEvent, SessionParts};
use crate::rlpx::{
    FrameCodec, InitiatorHandshake, ResponderHandshake, ACK_PACKET_LEN, AUTH_PACKET_LEN,
    HEADER_WIRE_LEN,
};
use crate::wire::{
    Capability, EthMessage, HeadersRequest, HeadersStart, Hello, P2pMessage, Status,
    BASE_PROTOCOL_OFFSET, ETH_PROTOCOL_VERSION, P2P_VERSION,
};
use crate::{node_id_of, peer::split_frame, NetError, NetResult};
use alloy_primitives::B256;
use ember_driver::Blocktree;
use ember_genesis::Enode;
use ember_primitives::{BlockBody, Header};
use k256::ecdsa::SigningKey;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The deadline for the full handshake, hello, and status exchange.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Network identity and chain parameters for session gating.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// The client identifier sent in hello.
    pub client_id: String,
    /// The TCP port advertised in hello.
    pub listen_port: u16,
    /// The chain id presented in status.
    pub network_id: u64,
    /// The genesis hash sessions must share.
    pub genesis_hash: B256,
}

/// [ChainView] over the shared blocktree.
#[derive(Debug, Clone)]
pub struct TreeChainView {
    tree: Arc<RwLock<Blocktree>>,
}

impl TreeChainView {
    /// Wraps the shared tree.
    pub fn new(tree: Arc<RwLock<Blocktree>>) -> Self {
        Self { tree }
    }

    fn status(&self, config: &NetworkConfig) -> Status {
        let tree = self.tree.read().expect("blocktree lock poisoned");
        Status {
            protocol_version: ETH_PROTOCOL_VERSION,
            network_id: config.network_id,
            total_difficulty: tree.total_difficulty(),
            best_hash: tree.best_hash(),
            genesis_hash: config.genesis_hash,
        }
    }
}

impl ChainView for TreeChainView {
    fn headers(&self, request: &HeadersRequest) -> Vec<Header> {
        let tree = self.tree.read().expect("blocktree lock poisoned");
        let start = match request.start {
            HeadersStart::Number(number) => Some(number),
            HeadersStart::Hash(hash) => tree.header(&hash).map(|header| header.number),
        };
        let Some(start) = start else {
            return Vec::new();
        };

        let step = request.skip.saturating_add(1);
        let mut headers = Vec::new();
        for index in 0..request.max.min(192) {
            let Some(offset) = index.checked_mul(step) else {
                break;
            };
            let number = if request.reverse {
                match start.checked_sub(offset) {
                    Some(number) => number,
                    None => break,
                }
            } else {
                match start.checked_add(offset) {
                    Some(number) => number,
                    None => break,
                }
            };
            let Some(block) = tree.canonical_block(number) else {
                break;
            };
            headers.push(block.header.clone());
        }
        headers
    }

    fn bodies(&self, hashes: &[B256]) -> Vec<BlockBody> {
        let tree = self.tree.read().expect("blocktree lock poisoned");
        hashes
            .iter()
            .filter_map(|hash| tree.entry(hash).map(|entry| entry.block.body()))
            .collect()
    }
}

/// Dials `remote` and runs the full session establishment: RLPx handshake,
/// hello, and status. On success the session tasks are spawned and the
/// handle registered in `peers`.
pub async fn connect_peer(
    key: &SigningKey,
    remote: Enode,
    config: &NetworkConfig,
    chain: Arc<TreeChainView>,
    peers: PeerSet,
    events: mpsc::Sender<SessionEvent>,
) -> NetResult<PeerHandle> {
    let established = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
        let mut stream = TcpStream::connect(remote.addr).await?;

        let (state, auth) = InitiatorHandshake::new(key, remote.id)?;
        stream.write_all(&auth).await?;
        let mut ack = [0u8; ACK_PACKET_LEN];
        stream.read_exact(&mut ack).await?;
        let secrets = state.finish(key, &ack)?;

        let codec = FrameCodec::new(secrets);
        session_gate(stream, codec, key, config, &chain).await
    })
    .await
    .map_err(|_| NetError::Timeout)??;

    let handle = spawn_session(established, chain, peers.clone(), events);
    peers.insert(handle.clone());
    info!(target: "net", peer = %handle.id, "outbound session established");
    Ok(handle)
}

/// Accepts inbound sessions forever. Each connection handshakes on its own
/// task; failures are logged and dropped.
pub async fn serve_incoming(
    listener: TcpListener,
    key: SigningKey,
    config: NetworkConfig,
    chain: Arc<TreeChainView>,
    peers: PeerSet,
    events: mpsc::Sender<SessionEvent>,
) {
    loop {
        let (stream, from) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(target: "net", %err, "accept failed");
                continue;
            }
        };
        let key = key.clone();
        let config = config.clone();
        let chain = chain.clone();
        let peers = peers.clone();
        let events = events.clone();

        tokio::spawn(async move {
            let established = tokio::time::timeout(
                HANDSHAKE_TIMEOUT,
                accept_session(stream, &key, &config, &chain),
            )
            .await
            .map_err(|_| NetError::Timeout)
            .and_then(|inner| inner);

            match established {
                Ok(parts) => {
                    let handle = spawn_session(parts, chain, peers.clone(), events);
                    peers.insert(handle.clone());
                    info!(target: "net", peer = %handle.id, "inbound session established");
                }
                Err(err) => {
                    debug!(target: "net", %from, %err, "inbound handshake failed");
                }
            }
        });
    }
}

async fn accept_session(
    mut stream: TcpStream,
    key: &SigningKey,
    config: &NetworkConfig,
    chain: &Arc<TreeChainView>,
) -> NetResult<SessionParts> {
    let mut auth = [0u8; AUTH_PACKET_LEN];
    stream.read_exact(&mut auth).await?;
    let (secrets, ack) = ResponderHandshake::respond(key, &auth)?;
    stream.write_all(&ack).await?;

    let codec = FrameCodec::new(secrets);
    session_gate(stream, codec, key, config, chain).await
}

/// The shared tail of session establishment: exchange hello, require a
/// common `eth/63`, exchange status, require the same chain, and split into
/// task parts.
async fn session_gate(
    mut stream: TcpStream,
    mut codec: FrameCodec,
    key: &SigningKey,
    config: &NetworkConfig,
    chain: &Arc<TreeChainView>,
) -> NetResult<SessionParts> {
    // Hello.
    let hello = P2pMessage::Hello(Hello {
        protocol_version: P2P_VERSION,
        client_id: config.client_id.clone(),
        capabilities: vec![Capability { name: "eth".to_string(), version: ETH_PROTOCOL_VERSION }],
        listen_port: config.listen_port.into(),
        node_id: node_id_of(key),
    });
    write_frame(&mut stream, &mut codec, &hello.to_frame()).await?;

    let frame = read_frame(&mut stream, &mut codec).await?;
    let (id, payload) = split_frame(&frame)?;
    let remote_id = match P2pMessage::from_frame(id, payload)? {
        P2pMessage::Hello(remote) => {
            let speaks_eth = remote.capabilities.iter().any(|capability| {
                capability.name == "eth" && capability.version == ETH_PROTOCOL_VERSION
            });
            if !speaks_eth {
                return Err(NetError::Protocol("no shared capability"));
            }
            remote.node_id
        }
        P2pMessage::Disconnect(reason) => return Err(NetError::Disconnected(reason as u8)),
        _ => return Err(NetError::Protocol("expected hello")),
    };

    // Status.
    let local_status = chain.status(config);
    let mut status_frame = ember_rlp::encode(&ember_rlp::Item::from_u64(
        BASE_PROTOCOL_OFFSET.into(),
    ));
    status_frame.extend_from_slice(&EthMessage::Status(local_status).payload());
    write_frame(&mut stream, &mut codec, &status_frame).await?;

    let frame = read_frame(&mut stream, &mut codec).await?;
    let (id, payload) = split_frame(&frame)?;
    if id != BASE_PROTOCOL_OFFSET {
        return Err(NetError::Protocol("expected status"));
    }
    let EthMessage::Status(remote_status) = EthMessage::from_payload(0x00, payload)? else {
        return Err(NetError::Protocol("expected status"));
    };
    if remote_status.network_id != config.network_id
        || remote_status.genesis_hash != config.genesis_hash
    {
        return Err(NetError::Protocol("foreign chain"));
    }

    let (read_half, write_half) = stream.into_split();
    let (encoder, decoder) = codec.split();
    Ok(SessionParts {
        remote_id,
        remote_status,
        read_half,
        write_half,
        encoder,
        decoder,
    })
}

async fn write_frame(
    stream: &mut TcpStream,
    codec: &mut FrameCodec,
    frame_data: &[u8],
) -> NetResult<()> {
    stream.write_all(&codec.write_frame(frame_data)).await?;
    Ok(())
}

async fn read_frame(stream: &mut TcpStream, codec: &mut FrameCodec) -> NetResult<Vec<u8>> {
    let mut header = [0u8; HEADER_WIRE_LEN];
    stream.read_exact(&mut header).await?;
    let body_len = codec.read_header(&header)?;
    let mut body = vec![0u8; body_len];
    stream.read_exact(&mut body).await?;
    codec.read_body(&body)
}

#[cfg(test)]
mod test {
    use super::*;
    use ember_genesis::ChainSpec;
    use ember_primitives::Block;

    fn network_fixture() -> (NetworkConfig, Arc<TreeChainView>, Arc<RwLock<Blocktree>>) {
        let mut spec = ChainSpec::ropsten();
        spec.genesis.state_root = alloy_primitives::B256::ZERO;
        let genesis = Block {
            header: spec.genesis_header(),
            transactions: vec![],
            ommers: vec![],
        };
        let genesis_hash = genesis.hash();
        let tree = Arc::new(RwLock::new(Blocktree::new(genesis)));
        let config = NetworkConfig {
            client_id: "ember/test".to_string(),
            listen_port: 0,
            network_id: spec.chain_id,
            genesis_hash,
        };
        (config, Arc::new(TreeChainView::new(tree.clone())), tree)
    }

    #[tokio::test]
    async fn test_dial_and_accept_full_session() {
        let (config, chain, _tree) = network_fixture();
        let server_key = SigningKey::from_slice(&[0x81u8; 32]).unwrap();
        let client_key = SigningKey::from_slice(&[0x82u8; 32]).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_addr = listener.local_addr().unwrap();
        let server_id = node_id_of(&server_key);

        let server_peers = PeerSet::new();
        let (server_events, _server_rx) = mpsc::channel(8);
        tokio::spawn(serve_incoming(
            listener,
            server_key,
            config.clone(),
            chain.clone(),
            server_peers.clone(),
            server_events,
        ));

        let client_peers = PeerSet::new();
        let (client_events, _client_rx) = mpsc::channel(8);
        let handle = connect_peer(
            &client_key,
            Enode { id: server_id, addr: server_addr },
            &config,
            chain.clone(),
            client_peers.clone(),
            client_events,
        )
        .await
        .unwrap();

        assert_eq!(handle.id, server_id);
        assert_eq!(handle.status.genesis_hash, config.genesis_hash);
        assert_eq!(client_peers.len(), 1);

        // The session answers header requests from the shared tree.
        use ember_driver::BlockSource;
        let headers = handle.request_headers(0, 10).await.unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].hash(), config.genesis_hash);

        handle.disconnect().await;
    }

    #[tokio::test]
    async fn test_foreign_chain_rejected() {
        let (config, chain, _tree) = network_fixture();
        let server_key = SigningKey::from_slice(&[0x83u8; 32]).unwrap();
        let client_key = SigningKey::from_slice(&[0x84u8; 32]).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_addr = listener.local_addr().unwrap();
        let server_id = node_id_of(&server_key);

        let (server_events, _server_rx) = mpsc::channel(8);
        tokio::spawn(serve_incoming(
            listener,
            server_key,
            config.clone(),
            chain.clone(),
            PeerSet::new(),
            server_events,
        ));

        // The dialer presents a different genesis.
        let mut foreign = config.clone();
        foreign.genesis_hash = alloy_primitives::keccak256(b"other chain");
        let (client_events, _client_rx) = mpsc::channel(8);
        let result = connect_peer(
            &client_key,
            Enode { id: server_id, addr: server_addr },
            &foreign,
            chain,
            PeerSet::new(),
            client_events,
        )
        .await;
        assert!(result.is_err());
    }
}
