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

//! Outcomes of a sync run.

use std::fmt::{self, Display, Formatter};

use poolsync_types::{NodeId, TxId};

/// Why a transaction could not be delivered to a node
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// The raw transaction could not be fetched from its source node
    FetchFailed {
        /// Source node name
        source: String,
        /// Error returned by the source
        error: String,
    },
    /// The target node refused the transaction for a reason other than
    /// missing inputs
    Rejected(String),
    /// Still rejected for missing inputs when the node stopped making progress
    Unresolved,
}

impl Display for FailureReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::FetchFailed { source, error } => {
                write!(f, "fetch from {source} failed: {error}")
            }
            FailureReason::Rejected(reason) => write!(f, "rejected: {reason}"),
            FailureReason::Unresolved => f.write_str("missing inputs, unresolved"),
        }
    }
}

/// A transaction that was not delivered, and why
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxFailure {
    /// The transaction
    pub txid: TxId,
    /// Why it failed
    pub reason: FailureReason,
}

/// Why a node's sync ended without completing
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeFailure {
    /// The node itself could not be reached
    Unreachable(String),
    /// A whole pass failed because no source node could be reached
    SourcesUnreachable,
    /// The run was cancelled
    Cancelled,
    /// The driver task died
    Panicked(String),
}

impl Display for NodeFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            NodeFailure::Unreachable(error) => write!(f, "node unreachable: {error}"),
            NodeFailure::SourcesUnreachable => f.write_str("no source node reachable"),
            NodeFailure::Cancelled => f.write_str("cancelled"),
            NodeFailure::Panicked(error) => write!(f, "sync task failed: {error}"),
        }
    }
}

/// Terminal state of a node in a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Every missing transaction was resolved or permanently failed
    Converged,
    /// A pass made no progress; some transactions remain missing
    Stalled,
    /// Sync was abandoned
    Failed(NodeFailure),
    /// The node's mempool could not be fetched, so it took no part in the run
    Excluded(String),
    /// The node's mempool was empty and empty targets are skipped
    Skipped,
}

impl NodeOutcome {
    /// True for outcomes where the node was synced as far as possible
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            NodeOutcome::Converged | NodeOutcome::Stalled | NodeOutcome::Skipped
        )
    }
}

impl Display for NodeOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            NodeOutcome::Converged => f.write_str("converged"),
            NodeOutcome::Stalled => f.write_str("stalled"),
            NodeOutcome::Failed(failure) => write!(f, "failed ({failure})"),
            NodeOutcome::Excluded(reason) => write!(f, "excluded ({reason})"),
            NodeOutcome::Skipped => f.write_str("skipped"),
        }
    }
}

/// Result of syncing one node
#[derive(Clone, Debug)]
pub struct NodeReport {
    /// Node id
    pub id: NodeId,
    /// Node name
    pub node: String,
    /// How the sync ended
    pub outcome: NodeOutcome,
    /// Number of passes executed
    pub passes: usize,
    /// Number of transactions accepted by the node or already known to it
    pub resolved: usize,
    /// Transactions that will not be delivered, in the order they failed
    pub failures: Vec<TxFailure>,
    /// Transactions still missing when the sync ended
    pub remaining: Vec<TxId>,
}

impl NodeReport {
    pub(crate) fn new(id: NodeId, node: String, outcome: NodeOutcome) -> Self {
        Self {
            id,
            node,
            outcome,
            passes: 0,
            resolved: 0,
            failures: vec![],
            remaining: vec![],
        }
    }
}

/// Result of a whole run
#[derive(Clone, Debug, Default)]
pub struct SyncReport {
    /// One report per configured node, in node order
    pub nodes: Vec<NodeReport>,
}

impl SyncReport {
    /// True if every node was synced as far as possible
    pub fn is_complete(&self) -> bool {
        self.nodes.iter().all(|n| n.outcome.is_complete())
    }

    /// Report for the node with the given id
    pub fn node(&self, id: NodeId) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.id == id)
    }
}
