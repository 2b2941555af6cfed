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

use std::fmt::Display;

use poolsync_types::TxId;

use crate::{FailureReason, NodeFailure};

/// Sync event
#[derive(Clone, Debug)]
pub struct SyncEvent {
    /// Name of the node the event is about
    pub node: String,
    /// Event kind
    pub kind: SyncEventKind,
}

impl SyncEvent {
    pub(crate) fn new(node: impl Into<String>, kind: SyncEventKind) -> Self {
        Self {
            node: node.into(),
            kind,
        }
    }
}

/// SyncEventKind
#[derive(Clone, Debug)]
pub enum SyncEventKind {
    /// The node's mempool was fetched
    MempoolFetched {
        /// Number of transactions in the mempool
        size: usize,
    },
    /// The node's mempool could not be fetched; it takes no part in the run
    NodeExcluded {
        /// Fetch error
        reason: String,
    },
    /// A delivery pass started
    PassStarted {
        /// Pass number, starting at 1
        pass: usize,
        /// Transactions to attempt in this pass
        pending: usize,
    },
    /// A transaction is now in the node's mempool
    TransactionResolved {
        /// The transaction
        txid: TxId,
        /// Node the transaction was fetched from
        source: String,
        /// True if the node reported it already had the transaction
        already_known: bool,
    },
    /// The node rejected a transaction for missing inputs; it is retried in
    /// the next pass
    TransactionDeferred {
        /// The transaction
        txid: TxId,
    },
    /// A transaction will not be delivered
    TransactionFailed {
        /// The transaction
        txid: TxId,
        /// Why
        reason: FailureReason,
    },
    /// Nothing is missing from the node anymore
    NodeConverged {
        /// Passes executed
        passes: usize,
        /// Transactions resolved
        resolved: usize,
    },
    /// A pass made no progress
    NodeStalled {
        /// Passes executed
        passes: usize,
        /// Transactions that are still missing
        remaining: Vec<TxId>,
    },
    /// Sync of the node was abandoned
    NodeFailed {
        /// Why
        reason: NodeFailure,
        /// Number of transactions still missing
        remaining: usize,
    },
}

impl SyncEventKind {
    /// True for events that are emitted once per transaction attempt
    pub fn is_per_transaction(&self) -> bool {
        matches!(
            self,
            SyncEventKind::TransactionResolved { .. }
                | SyncEventKind::TransactionDeferred { .. }
                | SyncEventKind::TransactionFailed { .. }
        )
    }
}

impl Display for SyncEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            SyncEventKind::MempoolFetched { size } => write!(
                f,
                concat!("Fetched mempool.", "    Node: {}", "    Size: {}"),
                self.node, size
            ),
            SyncEventKind::NodeExcluded { reason } => write!(
                f,
                concat!("Excluded node from run.", "    Node: {}", "    Reason: {}"),
                self.node, reason
            ),
            SyncEventKind::PassStarted { pass, pending } => write!(
                f,
                concat!("Started pass.", "    Node: {}", "    Pass: {}", "    Pending: {}"),
                self.node, pass, pending
            ),
            SyncEventKind::TransactionResolved {
                txid,
                source,
                already_known,
            } => write!(
                f,
                concat!(
                    "Resolved transaction.",
                    "    Node: {}",
                    "    Tx: {}",
                    "    Source: {}",
                    "{}"
                ),
                self.node,
                txid,
                source,
                if *already_known {
                    "    (already known)"
                } else {
                    ""
                }
            ),
            SyncEventKind::TransactionDeferred { txid } => write!(
                f,
                concat!(
                    "Deferred transaction with missing inputs.",
                    "    Node: {}",
                    "    Tx: {}"
                ),
                self.node, txid
            ),
            SyncEventKind::TransactionFailed { txid, reason } => write!(
                f,
                concat!(
                    "Failed to deliver transaction.",
                    "    Node: {}",
                    "    Tx: {}",
                    "    Reason: {}"
                ),
                self.node, txid, reason
            ),
            SyncEventKind::NodeConverged { passes, resolved } => write!(
                f,
                concat!(
                    "Node converged.",
                    "    Node: {}",
                    "    Passes: {}",
                    "    Resolved: {}"
                ),
                self.node, passes, resolved
            ),
            SyncEventKind::NodeStalled { passes, remaining } => write!(
                f,
                concat!(
                    "Node stalled.",
                    "    Node: {}",
                    "    Passes: {}",
                    "    Remaining: {}"
                ),
                self.node,
                passes,
                remaining
                    .iter()
                    .map(TxId::as_str)
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            SyncEventKind::NodeFailed { reason, remaining } => write!(
                f,
                concat!(
                    "Node failed.",
                    "    Node: {}",
                    "    Reason: {}",
                    "    Remaining: {}"
                ),
                self.node, reason, remaining
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let event = SyncEvent::new(
            "node-a",
            SyncEventKind::TransactionResolved {
                txid: "tx1".into(),
                source: "node-b".to_string(),
                already_known: true,
            },
        );
        assert_eq!(
            event.to_string(),
            "Resolved transaction.    Node: node-a    Tx: tx1    Source: node-b    (already known)"
        );

        let event = SyncEvent::new(
            "node-a",
            SyncEventKind::NodeStalled {
                passes: 2,
                remaining: vec!["tx8".into(), "tx9".into()],
            },
        );
        assert_eq!(
            event.to_string(),
            "Node stalled.    Node: node-a    Passes: 2    Remaining: tx8,tx9"
        );
    }
}
