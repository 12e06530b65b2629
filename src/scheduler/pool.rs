//! Idle-worker pool and peer roster
//!
//! The roster maps each known peer to the generation of its live worker.
//! A worker whose generation no longer matches is stale (its peer vanished
//! or it was retired) and is dropped instead of being handed out.

use crate::worker::Worker;
use crossbeam::queue::SegQueue;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use golem_protocol::{PeerHardware, PeerInfo};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Default)]
pub(crate) struct WorkerPool {
    idle: SegQueue<Worker>,
    roster: DashMap<String, u64>,
    next_generation: AtomicU64,
}

impl WorkerPool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_known(&self, node_id: &str) -> bool {
        self.roster.contains_key(node_id)
    }

    /// Create a worker for an unknown peer; `None` if already known
    pub(crate) fn admit(&self, peer: PeerInfo, hardware: PeerHardware) -> Option<u64> {
        match self.roster.entry(peer.node_id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
                slot.insert(generation);
                self.idle.push(Worker::new(peer, hardware, generation));
                Some(generation)
            }
        }
    }

    /// Replace the known-peer set; returns evicted node ids
    pub(crate) fn retain_peers(&self, live: &HashSet<String>) -> Vec<String> {
        let mut evicted = Vec::new();
        self.roster.retain(|node_id, _| {
            let keep = live.contains(node_id);
            if !keep {
                evicted.push(node_id.clone());
            }
            keep
        });
        evicted
    }

    fn is_current(&self, worker: &Worker) -> bool {
        self.roster
            .get(worker.node_id())
            .is_some_and(|g| *g == worker.generation())
    }

    /// Pop the next live idle worker, dropping stale ones
    pub(crate) fn checkout(&self) -> Option<Worker> {
        while let Some(worker) = self.idle.pop() {
            if self.is_current(&worker) {
                return Some(worker);
            }
            debug!(node_id = worker.node_id(), generation = worker.generation(), "Dropping stale worker");
        }
        None
    }

    /// Return a worker after dispatch; stale workers are dropped
    pub(crate) fn checkin(&self, worker: Worker) -> bool {
        if self.is_current(&worker) {
            self.idle.push(worker);
            true
        } else {
            debug!(node_id = worker.node_id(), "Not re-admitting stale worker");
            false
        }
    }

    /// Forget a peer if `generation` is still its live worker
    pub(crate) fn retire(&self, node_id: &str, generation: u64) {
        self.roster.remove_if(node_id, |_, g| *g == generation);
    }

    /// Take every idle worker out of the pool and forget their peers
    pub(crate) fn retire_idle(&self) -> Vec<Worker> {
        let mut retired = Vec::new();
        while let Some(worker) = self.idle.pop() {
            self.retire(worker.node_id(), worker.generation());
            retired.push(worker);
        }
        retired
    }

    pub(crate) fn idle_len(&self) -> usize {
        self.idle.len()
    }

    pub(crate) fn known_len(&self) -> usize {
        self.roster.len()
    }
}
