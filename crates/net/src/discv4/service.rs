//! The discovery task: one UDP socket, the routing table, and the
//! ping/pong/lookup choreography.

use crate::discv4::{
    message::check_expiration, Endpoint, KademliaTable, NodeRecord, Packet, PingMessage,
    PongMessage,
};
use crate::{node_id_of, NetResult, NodeId};
use alloy_primitives::B256;
use ember_genesis::Enode;
use k256::ecdsa::SigningKey;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::{net::UdpSocket, sync::mpsc, time};
use tracing::{debug, trace, warn};

/// How long an unanswered ping stays pending.
const PING_TIMEOUT: Duration = Duration::from_millis(1500);

/// How far in the future outgoing packets expire.
const EXPIRATION_WINDOW: Duration = Duration::from_secs(20);

/// How often a self-lookup refreshes the table.
const LOOKUP_INTERVAL: Duration = Duration::from_secs(30);

/// The largest packet discovery will accept.
const MAX_PACKET_SIZE: usize = 1280;

/// Discovery configuration.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// The UDP address to bind.
    pub listen: SocketAddr,
    /// Peers to bootstrap the table from.
    pub bootnodes: Vec<Enode>,
}

/// Commands accepted by the running service.
enum Command {
    /// Asks for the current closest records to our own id.
    Closest(tokio::sync::oneshot::Sender<Vec<NodeRecord>>),
}

/// A handle to the running discovery task.
#[derive(Debug, Clone)]
pub struct DiscoveryHandle {
    commands: mpsc::Sender<Command>,
}

impl DiscoveryHandle {
    /// The freshest records near our own id, for the dialer.
    pub async fn candidates(&self) -> Vec<NodeRecord> {
        let (reply, response) = tokio::sync::oneshot::channel();
        if self.commands.send(Command::Closest(reply)).await.is_err() {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }
}

impl core::fmt::Debug for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Command::Closest")
    }
}

/// The discovery service state, owned by its task.
pub struct Discovery {
    socket: UdpSocket,
    key: SigningKey,
    local_id: NodeId,
    local_endpoint: Endpoint,
    table: KademliaTable,
    /// Outstanding pings: hash of the ping, recipient, and the deadline.
    pending_pings: HashMap<B256, (NodeId, time::Instant)>,
    /// Full-bucket eviction probes: stale id awaiting pong, with the
    /// replacement candidate.
    eviction_probes: HashMap<NodeId, NodeRecord>,
    commands: mpsc::Receiver<Command>,
}

impl core::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Discovery")
            .field("local_id", &self.local_id)
            .field("tracked", &self.table.len())
            .finish_non_exhaustive()
    }
}

impl Discovery {
    /// Binds the discovery socket and returns the service with its handle.
    pub async fn bind(
        config: DiscoveryConfig,
        key: SigningKey,
    ) -> NetResult<(Self, DiscoveryHandle)> {
        let socket = UdpSocket::bind(config.listen).await?;
        let local_id = node_id_of(&key);
        let local_endpoint = Endpoint::from_addr(socket.local_addr()?);
        let (tx, rx) = mpsc::channel(64);

        let mut service = Self {
            socket,
            key,
            local_id,
            local_endpoint,
            table: KademliaTable::new(local_id),
            pending_pings: HashMap::new(),
            eviction_probes: HashMap::new(),
            commands: rx,
        };
        for bootnode in &config.bootnodes {
            service.send_ping(bootnode.id, Endpoint::from_addr(bootnode.addr)).await;
        }
        Ok((service, DiscoveryHandle { commands: tx }))
    }

    /// Runs until the handle side is dropped.
    pub async fn run(mut self) {
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let mut lookup_timer = time::interval(LOOKUP_INTERVAL);
        let mut reaper = time::interval(PING_TIMEOUT);

        loop {
            tokio::select! {
                incoming = self.socket.recv_from(&mut buf) => {
                    match incoming {
                        Ok((len, from)) => {
                            if let Err(err) = self.handle_packet(&buf[..len], from).await {
                                trace!(target: "net::discv4", %from, %err, "dropping packet");
                            }
                        }
                        Err(err) => {
                            warn!(target: "net::discv4", %err, "udp receive failed");
                        }
                    }
                }
                _ = lookup_timer.tick() => {
                    self.lookup_round().await;
                }
                _ = reaper.tick() => {
                    self.reap_pending();
                }
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Closest(reply)) => {
                            let _ = reply.send(self.table.closest(&self.local_id, 16));
                        }
                        None => break,
                    }
                }
            }
        }
    }

    async fn handle_packet(&mut self, wire: &[u8], from: SocketAddr) -> NetResult<()> {
        let (packet, sender, hash) = Packet::open(wire)?;
        let now = unix_now();

        match packet {
            Packet::Ping(ping) => {
                check_expiration(ping.expiration, now)?;
                let pong = Packet::Pong(PongMessage {
                    to: Endpoint { ip: from.ip(), udp_port: from.port(), tcp_port: ping.from.tcp_port },
                    ping_hash: hash,
                    expiration: now + EXPIRATION_WINDOW.as_secs(),
                });
                self.send_packet(&pong, from).await;
                self.note_alive(sender, Endpoint { ip: from.ip(), udp_port: from.port(), tcp_port: ping.from.tcp_port }).await;
            }
            Packet::Pong(pong) => {
                check_expiration(pong.expiration, now)?;
                if self.pending_pings.remove(&pong.ping_hash).is_some() {
                    self.eviction_probes.remove(&sender);
                    self.note_alive(sender, Endpoint { ip: from.ip(), udp_port: from.port(), tcp_port: pong.to.tcp_port }).await;
                    // A bonded peer is fair game for a neighbour walk.
                    let find = Packet::FindNode {
                        target: self.local_id,
                        expiration: now + EXPIRATION_WINDOW.as_secs(),
                    };
                    self.send_packet(&find, from).await;
                }
            }
            Packet::FindNode { target, expiration } => {
                check_expiration(expiration, now)?;
                let nodes = self
                    .table
                    .closest(&target, 16)
                    .into_iter()
                    .map(|record| (record.endpoint, record.id))
                    .collect();
                let neighbours = Packet::Neighbours {
                    nodes,
                    expiration: now + EXPIRATION_WINDOW.as_secs(),
                };
                self.send_packet(&neighbours, from).await;
            }
            Packet::Neighbours { nodes, expiration } => {
                check_expiration(expiration, now)?;
                debug!(
                    target: "net::discv4",
                    count = nodes.len(),
                    "received neighbours"
                );
                for (endpoint, id) in nodes {
                    if id != self.local_id {
                        self.send_ping(id, endpoint).await;
                    }
                }
            }
        }
        Ok(())
    }

    /// Inserts or refreshes a proven-alive node, probing the eviction
    /// candidate when its bucket is full.
    async fn note_alive(&mut self, id: NodeId, endpoint: Endpoint) {
        if let Some(stale) = self.table.note_seen(id, endpoint) {
            self.eviction_probes
                .insert(stale.id, NodeRecord { id, endpoint, failures: 0 });
            self.send_ping(stale.id, stale.endpoint).await;
        }
    }

    async fn send_ping(&mut self, id: NodeId, endpoint: Endpoint) {
        let now = unix_now();
        let ping = Packet::Ping(PingMessage {
            from: self.local_endpoint,
            to: endpoint,
            expiration: now + EXPIRATION_WINDOW.as_secs(),
        });
        let Ok((wire, hash)) = ping.seal(&self.key) else {
            return;
        };
        if self.socket.send_to(&wire, endpoint.udp_addr()).await.is_ok() {
            self.pending_pings
                .insert(hash, (id, time::Instant::now() + PING_TIMEOUT));
        }
    }

    async fn send_packet(&self, packet: &Packet, to: SocketAddr) {
        let Ok((wire, _)) = packet.seal(&self.key) else {
            return;
        };
        if let Err(err) = self.socket.send_to(&wire, to).await {
            trace!(target: "net::discv4", %to, %err, "udp send failed");
        }
    }

    /// Re-pings a sample of the table toward our own id.
    async fn lookup_round(&mut self) {
        let sample = self.table.closest(&self.local_id, 8);
        for record in sample {
            self.send_ping(record.id, record.endpoint).await;
        }
    }

    /// Times out unanswered pings and applies their strikes.
    fn reap_pending(&mut self) {
        let now = time::Instant::now();
        let expired: Vec<B256> = self
            .pending_pings
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(hash, _)| *hash)
            .collect();
        for hash in expired {
            if let Some((id, _)) = self.pending_pings.remove(&hash) {
                self.table.note_failure(&id);
                // An eviction probe that timed out settles the replacement.
                if let Some(fresh) = self.eviction_probes.remove(&id) {
                    self.table.replace(&id, fresh);
                }
            }
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_two_services_bond() {
        let key_a = SigningKey::from_slice(&[0x51u8; 32]).unwrap();
        let key_b = SigningKey::from_slice(&[0x52u8; 32]).unwrap();

        let (service_b, _handle_b) = Discovery::bind(
            DiscoveryConfig { listen: "127.0.0.1:0".parse().unwrap(), bootnodes: vec![] },
            key_b.clone(),
        )
        .await
        .unwrap();
        let b_addr = service_b.socket.local_addr().unwrap();

        let (service_a, handle_a) = Discovery::bind(
            DiscoveryConfig {
                listen: "127.0.0.1:0".parse().unwrap(),
                bootnodes: vec![Enode { id: node_id_of(&key_b), addr: b_addr }],
            },
            key_a,
        )
        .await
        .unwrap();

        tokio::spawn(service_a.run());
        tokio::spawn(service_b.run());

        // The bootstrap ping/pong exchange lands B in A's table.
        let mut found = false;
        for _ in 0..50 {
            time::sleep(Duration::from_millis(20)).await;
            let candidates = handle_a.candidates().await;
            if candidates.iter().any(|record| record.id == node_id_of(&key_b)) {
                found = true;
                break;
            }
        }
        assert!(found, "bootstrap bond never completed");
    }
}
