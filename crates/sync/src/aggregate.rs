// This file is part of Poolsync.
//
// Poolsync is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Poolsync is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Poolsync.
// If not, see https://www.gnu.org/licenses/.

use std::collections::HashMap;

use poolsync_types::{NodeId, TxId};

/// The mempool of one node, as fetched at the start of a run.
///
/// Snapshots are never refreshed during a run.
#[derive(Clone, Debug, Default)]
pub struct MempoolSnapshot {
    /// Node the snapshot was taken from
    pub node: NodeId,
    /// Transaction ids in the order the node reported them
    pub txids: Vec<TxId>,
}

impl MempoolSnapshot {
    /// Create a new snapshot
    pub fn new(node: NodeId, txids: Vec<TxId>) -> Self {
        Self { node, txids }
    }
}

/// Union of the mempools of every node in a run.
///
/// Each transaction maps to exactly one source node, the node its raw bytes
/// are fetched from when delivering it elsewhere. The source is the first
/// node, in `NodeId` order, whose snapshot contains the transaction. Nothing
/// else (latency, reliability) is taken into account.
#[derive(Clone, Debug, Default)]
pub struct UnionPool {
    items: Vec<TxId>,
    sources: HashMap<TxId, NodeId>,
}

impl UnionPool {
    /// Build the union of the given snapshots.
    ///
    /// Snapshots are visited in `NodeId` order regardless of the order they
    /// are passed in, so the result does not depend on which fetch finished
    /// first.
    pub fn from_snapshots<'a>(snapshots: impl IntoIterator<Item = &'a MempoolSnapshot>) -> Self {
        let mut snapshots: Vec<_> = snapshots.into_iter().collect();
        snapshots.sort_by_key(|s| s.node);

        let mut pool = Self::default();
        for snapshot in snapshots {
            for txid in &snapshot.txids {
                if !pool.sources.contains_key(txid) {
                    pool.sources.insert(txid.clone(), snapshot.node);
                    pool.items.push(txid.clone());
                }
            }
        }
        pool
    }

    /// All transaction ids, each exactly once, in first-seen order
    pub fn items(&self) -> &[TxId] {
        &self.items
    }

    /// The node to fetch the transaction from, if it is in the pool
    pub fn source(&self, txid: &TxId) -> Option<NodeId> {
        self.sources.get(txid).copied()
    }

    /// Number of distinct transactions
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if no node had any pending transaction
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
