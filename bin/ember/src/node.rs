//! Node assembly: wiring the store, blocktree, network tasks, and the sync
//! loop together, and tearing them down again.

use crate::EmberCli;
use anyhow::{Context, Result};
use ember_driver::{Blocktree, NodeHandle, SyncDriver};
use ember_executor::{BlockExecutor, EthashVerifier};
use ember_genesis::{ChainSpec, Enode};
use ember_mpt::MemoryTrieStore;
use ember_net::{
    connect_peer, discv4::{Discovery, DiscoveryConfig}, serve_incoming, NetworkConfig, PeerSet,
    SessionEvent, TreeChainView,
};
use ember_primitives::Block;
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, RwLock,
};
use std::time::Duration;
use tokio::{net::TcpListener, sync::mpsc};
use tracing::{info, warn};

/// How often the node looks for a heavier peer to sync from.
const SYNC_INTERVAL: Duration = Duration::from_secs(5);

/// The soft cap on dialed peers.
const TARGET_PEERS: usize = 25;

/// Everything resolved from the CLI before the runtime starts. Resolution
/// failures are configuration errors (exit code 1).
#[derive(Debug)]
pub(crate) struct NodeConfig {
    pub spec: ChainSpec,
    pub bootnodes: Vec<Enode>,
    pub port: u16,
    pub discovery: bool,
    pub sync: bool,
}

impl NodeConfig {
    pub(crate) fn from_cli(cli: &EmberCli) -> Result<Self> {
        let spec = match &cli.chain_file {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading chain file {}", path.display()))?;
                ChainSpec::from_json(&json).context("parsing chain file")?
            }
            None => ChainSpec::by_name(&cli.chain).context("resolving chain preset")?,
        };

        let bootnodes = if cli.bootnodes == "from_chain" {
            spec.bootnodes
                .iter()
                .map(|url| url.parse().context("chain preset bootnode"))
                .collect::<Result<Vec<Enode>>>()?
        } else {
            cli.bootnodes
                .split(',')
                .filter(|url| !url.is_empty())
                .map(|url| url.parse().with_context(|| format!("bootnode {url}")))
                .collect::<Result<Vec<Enode>>>()?
        };

        if cli.warp {
            warn!("warp sync is not supported; continuing with full sync");
        }
        if cli.debug {
            info!("remote debugging hooks enabled");
        }

        Ok(Self {
            spec,
            bootnodes,
            port: cli.port,
            discovery: !cli.no_discovery,
            sync: !cli.no_sync,
        })
    }
}

/// Runs the node until interrupted. Errors out of here are fatal runtime
/// failures (exit code 2).
pub(crate) async fn run(config: NodeConfig) -> Result<()> {
    let spec = Arc::new(config.spec);
    let store = Arc::new(MemoryTrieStore::new());
    let seal = Arc::new(EthashVerifier::new());

    let genesis = Block {
        header: spec.genesis_header(),
        transactions: vec![],
        ommers: vec![],
    };
    let genesis_hash = genesis.hash();
    info!(chain = %spec.name, %genesis_hash, "starting node");

    let tree = Arc::new(RwLock::new(Blocktree::new(genesis)));
    let chain_view = Arc::new(TreeChainView::new(tree.clone()));
    let peers = PeerSet::new();
    let syncing = Arc::new(AtomicBool::new(false));
    // The query surface the JSON-RPC collaborator attaches to.
    let _node_handle = NodeHandle::new(
        spec.clone(),
        store.clone(),
        tree.clone(),
        peers.counter(),
        syncing.clone(),
    );

    let key = SigningKey::random(&mut OsRng);
    let network = NetworkConfig {
        client_id: format!("ember/v{}", env!("CARGO_PKG_VERSION")),
        listen_port: config.port,
        network_id: spec.chain_id,
        genesis_hash,
    };
    let (events_tx, mut events_rx) = mpsc::channel::<SessionEvent>(256);

    // Discovery task. The handle must outlive the run loop: dropping it
    // closes the command channel and stops the service.
    let mut _discovery_handle = None;
    if config.discovery {
        let (discovery, handle) = Discovery::bind(
            DiscoveryConfig {
                listen: ([0, 0, 0, 0], config.port).into(),
                bootnodes: config.bootnodes.clone(),
            },
            key.clone(),
        )
        .await
        .context("binding discovery socket")?;
        tokio::spawn(discovery.run());
        _discovery_handle = Some(handle);
    }

    // TCP acceptor task.
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .context("binding RLPx listener")?;
    tokio::spawn(serve_incoming(
        listener,
        key.clone(),
        network.clone(),
        chain_view.clone(),
        peers.clone(),
        events_tx.clone(),
    ));

    // Bootstrap dials.
    for bootnode in config.bootnodes.clone() {
        let key = key.clone();
        let network = network.clone();
        let chain_view = chain_view.clone();
        let peers = peers.clone();
        let events = events_tx.clone();
        tokio::spawn(async move {
            if peers.len() >= TARGET_PEERS {
                return;
            }
            if let Err(err) =
                connect_peer(&key, bootnode, &network, chain_view, peers, events).await
            {
                warn!(%err, "bootnode dial failed");
            }
        });
    }

    // The sync loop: serialized block application, per spec the only writer
    // of the blocktree.
    let mut sync_timer = tokio::time::interval(SYNC_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            event = events_rx.recv() => {
                match event {
                    Some(SessionEvent::NewBlock { block, total_difficulty: _, from }) => {
                        info!(
                            number = block.header.number,
                            %from,
                            "new block announced"
                        );
                        if config.sync {
                            sync_round(&spec, &store, seal.as_ref(), &tree, &peers, &syncing)
                                .await;
                        }
                    }
                    Some(SessionEvent::Closed(id)) => {
                        info!(peer = %id, "session closed");
                    }
                    None => {}
                }
            }
            _ = sync_timer.tick() => {
                if config.sync {
                    sync_round(&spec, &store, seal.as_ref(), &tree, &peers, &syncing).await;
                }
            }
        }
    }

    Ok(())
}

/// One sync round against the heaviest-advertising peer.
async fn sync_round(
    spec: &ChainSpec,
    store: &MemoryTrieStore,
    seal: &EthashVerifier,
    tree: &RwLock<Blocktree>,
    peers: &PeerSet,
    syncing: &AtomicBool,
) {
    let Some(peer) = peers.best_peer() else {
        return;
    };
    syncing.store(true, Ordering::Relaxed);

    let executor = BlockExecutor::new(spec, store, seal);
    let mut driver = SyncDriver::new(tree, executor);
    match driver.sync_from(&peer, peer.status.total_difficulty).await {
        Ok(applied) if applied > 0 => {
            info!(applied, "extended chain");
        }
        Ok(_) => {}
        Err(err) => {
            warn!(%err, "sync round failed; dropping peer");
            peer.disconnect().await;
        }
    }
    syncing.store(false, Ordering::Relaxed);
}
