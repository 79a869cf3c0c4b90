use std::{collections::HashSet, sync::Arc};

use alloy_primitives::B256;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{kv::PoolDb, pool::TxPool, senders::StateProvider, types::PeerId};

/// Sink for hash propagation towards the gossip layer. The wire loop lives
/// outside the pool; this is the boundary it plugs into.
pub trait PeerSync: Send + Sync {
    /// Announce freshly promoted hashes to connected peers.
    fn broadcast_new(&self, hashes: &[B256]);

    /// Hand all pooled hashes to a batch of recently connected peers.
    fn propagate_to_peers(&self, peers: &[PeerId], hashes: &[B256]);
}

/// Sink for deployments without gossip.
#[derive(Debug, Default)]
pub struct NoopPeerSync;

impl PeerSync for NoopPeerSync {
    fn broadcast_new(&self, _hashes: &[B256]) {}
    fn propagate_to_peers(&self, _peers: &[PeerId], _hashes: &[B256]) {}
}

/// Drives the pool's periodic work until cancelled: remote-batch draining,
/// persistence commits, stats logging, pooled-hash sync to new peers, and
/// fan-out of promoted-hash notifications to streaming subscribers.
///
/// Cancellation performs a final flush so a clean shutdown loses nothing.
pub async fn main_loop(
    pool: Arc<TxPool>,
    db: Arc<dyn PoolDb>,
    state: Arc<dyn StateProvider>,
    peer_sync: Arc<dyn PeerSync>,
    mut new_pending_txs: mpsc::Receiver<Vec<B256>>,
    on_add: broadcast::Sender<Vec<B256>>,
    cancel: CancellationToken,
) {
    let cfg = pool.config();
    let mut process_remote_every = interval(cfg.process_remote_txs_every);
    let mut commit_every = interval(cfg.commit_every);
    let mut log_every = interval(cfg.log_every);
    let mut sync_to_new_peers_every = interval(cfg.sync_to_new_peers_every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if pool.started() {
                    if let Err(err) = pool.flush(&*db) {
                        error!(target: "txpool", %err, "final flush on shutdown failed");
                    }
                }
                return;
            }
            _ = process_remote_every.tick() => {
                if !pool.started() {
                    continue;
                }
                match state.view() {
                    Ok(view) => {
                        if let Err(err) = pool.process_remote_txs(&*view) {
                            warn!(target: "txpool", %err, "processing remote batch failed");
                        }
                    }
                    Err(err) => warn!(target: "txpool", %err, "acquiring state view failed"),
                }
            }
            _ = commit_every.tick() => {
                if !pool.started() {
                    continue;
                }
                match pool.flush(&*db) {
                    Ok(()) => debug!(target: "txpool", "committed"),
                    Err(err) => error!(target: "txpool", %err, "flush failed"),
                }
            }
            _ = log_every.tick() => pool.log_stats(),
            _ = sync_to_new_peers_every.tick() => {
                let peers = pool.drain_recently_connected_peers();
                if peers.is_empty() {
                    continue;
                }
                let mut hashes = Vec::new();
                pool.append_all_hashes(&mut hashes);
                peer_sync.propagate_to_peers(&peers, &hashes);
            }
            maybe_hashes = new_pending_txs.recv() => {
                let Some(mut hashes) = maybe_hashes else {
                    // pool dropped its sender; nothing more will arrive
                    return;
                };
                // drain a few more batches before fanning out, then dedup
                for _ in 0..16 {
                    match new_pending_txs.try_recv() {
                        Ok(more) => hashes.extend(more),
                        Err(_) => break,
                    }
                }
                let hashes = dedup_preserving_order(hashes);
                if hashes.is_empty() {
                    continue;
                }
                peer_sync.broadcast_new(&hashes);
                // subscribers may lag or be absent; both are fine
                let _ = on_add.send(hashes);
            }
        }
    }
}

fn dedup_preserving_order(hashes: Vec<B256>) -> Vec<B256> {
    let mut seen = HashSet::with_capacity(hashes.len());
    hashes.into_iter().filter(|hash| seen.insert(*hash)).collect()
}
