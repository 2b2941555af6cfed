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

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::Mutex;
use poolsync_sync::{NodeOutcome, SyncEvent, SyncEventKind, SyncReport};
use poolsync_utils::emit;
use tokio::{sync::broadcast, task::JoinHandle};

/// Per-node counters tallied from sync events
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeProgress {
    pub mempool_size: Option<usize>,
    pub sent: usize,
    pub already_known: usize,
    pub deferred: usize,
}

/// Shared tally of sync progress, keyed by node name
#[derive(Clone, Debug, Default)]
pub struct Progress(Arc<Mutex<BTreeMap<String, NodeProgress>>>);

impl Progress {
    /// Start tallying events from `rx` until the channel closes
    pub fn track(rx: broadcast::Receiver<SyncEvent>) -> (Self, JoinHandle<()>) {
        let progress = Self::default();
        let handle = emit::receive_events("progress", rx, {
            let progress = progress.clone();
            move |event| progress.record(&event)
        });
        (progress, handle)
    }

    pub fn record(&self, event: &SyncEvent) {
        let mut nodes = self.0.lock();
        let node = nodes.entry(event.node.clone()).or_default();
        match &event.kind {
            SyncEventKind::MempoolFetched { size } => node.mempool_size = Some(*size),
            SyncEventKind::TransactionResolved {
                already_known: true,
                ..
            } => node.already_known += 1,
            SyncEventKind::TransactionResolved { .. } => node.sent += 1,
            SyncEventKind::TransactionDeferred { .. } => node.deferred += 1,
            _ => {}
        }
    }

    pub fn node(&self, name: &str) -> NodeProgress {
        self.0.lock().get(name).cloned().unwrap_or_default()
    }
}

/// Log one line per node, plus every failed transaction
pub fn log_summary(report: &SyncReport, progress: &Progress) {
    for node in &report.nodes {
        let tally = progress.node(&node.node);
        let line = format!(
            "{} {}: mempool {}, sent {}, already known {}, deferred {}, failed {}, passes {}",
            node.id,
            node.node,
            tally
                .mempool_size
                .map_or_else(|| "-".to_string(), |size| size.to_string()),
            tally.sent,
            tally.already_known,
            tally.deferred,
            node.failures.len(),
            node.passes,
        );
        match &node.outcome {
            NodeOutcome::Converged | NodeOutcome::Skipped => {
                tracing::info!("{line} ({})", node.outcome)
            }
            NodeOutcome::Stalled => tracing::warn!("{line} ({})", node.outcome),
            NodeOutcome::Failed(_) | NodeOutcome::Excluded(_) => {
                tracing::error!("{line} ({})", node.outcome)
            }
        }
        for failure in &node.failures {
            tracing::warn!("    {} {}: {}", node.node, failure.txid, failure.reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use poolsync_sync::FailureReason;
    use poolsync_types::TxId;

    use super::*;

    fn event(node: &str, kind: SyncEventKind) -> SyncEvent {
        SyncEvent {
            node: node.to_string(),
            kind,
        }
    }

    #[tokio::test]
    async fn test_tally() {
        let (tx, rx) = broadcast::channel(16);
        let (progress, handle) = Progress::track(rx);

        tx.send(event("a", SyncEventKind::MempoolFetched { size: 2 }))
            .unwrap();
        tx.send(event("b", SyncEventKind::MempoolFetched { size: 0 }))
            .unwrap();
        tx.send(event(
            "b",
            SyncEventKind::PassStarted {
                pass: 1,
                pending: 2,
            },
        ))
        .unwrap();
        tx.send(event(
            "b",
            SyncEventKind::TransactionResolved {
                txid: TxId::from("tx1"),
                source: "a".to_string(),
                already_known: false,
            },
        ))
        .unwrap();
        tx.send(event(
            "b",
            SyncEventKind::TransactionResolved {
                txid: TxId::from("tx2"),
                source: "a".to_string(),
                already_known: true,
            },
        ))
        .unwrap();
        tx.send(event(
            "b",
            SyncEventKind::TransactionFailed {
                txid: TxId::from("tx3"),
                reason: FailureReason::Rejected("dust".to_string()),
            },
        ))
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(
            progress.node("a"),
            NodeProgress {
                mempool_size: Some(2),
                ..Default::default()
            }
        );
        assert_eq!(
            progress.node("b"),
            NodeProgress {
                mempool_size: Some(0),
                sent: 1,
                already_known: 1,
                deferred: 0,
            }
        );
        assert_eq!(progress.node("c"), NodeProgress::default());
    }
}
