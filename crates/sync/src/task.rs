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

use std::sync::Arc;

use futures::future;
use poolsync_provider::{NodeRpc, ProviderError};
use poolsync_types::TxId;
use poolsync_utils::{
    handle,
    retry::{self, RetryOpts},
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    emit::{SyncEvent, SyncEventKind},
    report::{NodeFailure, NodeOutcome, NodeReport, SyncReport},
    ConvergenceDriver, DriverSettings, MempoolSnapshot, SyncNode, UnionPool,
};

/// Arguments for a sync run
#[derive(Clone, Copy, Debug)]
pub struct Args {
    /// Retry settings for mempool fetches. A node whose fetch still fails is
    /// excluded from the run.
    pub fetch_retry: RetryOpts,
    /// Maximum number of deliveries in flight per node within a pass
    pub delivery_concurrency: usize,
    /// Do not sync to nodes whose mempool snapshot is empty. They still
    /// contribute to the union.
    pub skip_empty_targets: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            fetch_retry: RetryOpts::default(),
            delivery_concurrency: 1,
            skip_empty_targets: false,
        }
    }
}

/// One reconciliation run over a fixed set of nodes.
///
/// Snapshots every mempool, builds the union pool and then drives every node
/// towards it in its own task. Per-node failures never abort other nodes.
#[derive(Debug)]
pub struct SyncTask<P> {
    args: Args,
    nodes: Vec<SyncNode<P>>,
    event_sender: broadcast::Sender<SyncEvent>,
}

impl<P> SyncTask<P>
where
    P: NodeRpc,
{
    /// Create a new sync task. Node ids must be unique.
    pub fn new(
        args: Args,
        nodes: Vec<SyncNode<P>>,
        event_sender: broadcast::Sender<SyncEvent>,
    ) -> Self {
        Self {
            args,
            nodes,
            event_sender,
        }
    }

    /// Run to completion, returning one report per node ordered by node id
    pub async fn run(self, shutdown: CancellationToken) -> SyncReport {
        info!("Starting mempool sync across {} nodes", self.nodes.len());

        let fetched = future::join_all(
            self.nodes
                .iter()
                .map(|node| self.fetch_mempool(node, &shutdown)),
        )
        .await;

        let mut reports = vec![];
        let mut snapshots = vec![];
        for (node, result) in self.nodes.iter().zip(fetched) {
            match result {
                Ok(txids) => {
                    info!("Fetched {} transactions from {}", txids.len(), node.name);
                    self.emit(&node.name, SyncEventKind::MempoolFetched { size: txids.len() });
                    snapshots.push(MempoolSnapshot::new(node.id, txids));
                }
                Err(reason) => {
                    warn!("Excluding {} from this run: {reason}", node.name);
                    self.emit(
                        &node.name,
                        SyncEventKind::NodeExcluded {
                            reason: reason.clone(),
                        },
                    );
                    reports.push(NodeReport::new(
                        node.id,
                        node.name.clone(),
                        NodeOutcome::Excluded(reason),
                    ));
                }
            }
        }

        let pool = Arc::new(UnionPool::from_snapshots(&snapshots));
        info!(
            "Union pool holds {} transactions from {} nodes",
            pool.len(),
            snapshots.len()
        );

        let nodes: Arc<[SyncNode<P>]> = self.nodes.iter().cloned().collect();
        let settings = DriverSettings {
            delivery_concurrency: self.args.delivery_concurrency,
        };
        let mut handles = vec![];
        for snapshot in &snapshots {
            let Some(target) = nodes.iter().find(|node| node.id == snapshot.node) else {
                continue;
            };
            if self.args.skip_empty_targets && snapshot.txids.is_empty() {
                info!("Skipping {} with an empty mempool", target.name);
                reports.push(NodeReport::new(
                    target.id,
                    target.name.clone(),
                    NodeOutcome::Skipped,
                ));
                continue;
            }

            let driver = ConvergenceDriver::new(
                target.clone(),
                Arc::clone(&nodes),
                Arc::clone(&pool),
                &snapshot.txids,
                settings,
                self.event_sender.clone(),
            );
            let handle = tokio::spawn(driver.run(shutdown.clone()));
            handles.push((target.clone(), handle));
        }

        for (target, handle) in handles {
            let report = match handle::as_anyhow_handle(handle).await {
                Ok(report) => report,
                Err(e) => {
                    error!("Sync task for {} failed: {e:?}", target.name);
                    NodeReport::new(
                        target.id,
                        target.name,
                        NodeOutcome::Failed(NodeFailure::Panicked(e.to_string())),
                    )
                }
            };
            reports.push(report);
        }

        reports.sort_by_key(|report| report.id);
        SyncReport { nodes: reports }
    }

    async fn fetch_mempool(
        &self,
        node: &SyncNode<P>,
        shutdown: &CancellationToken,
    ) -> Result<Vec<TxId>, String> {
        let description = format!("fetch mempool of {}", node.name);
        let fetch = retry::with_retries(
            &description,
            || node.rpc.get_raw_mempool(),
            self.args.fetch_retry,
            ProviderError::is_transient,
        );

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err("mempool fetch cancelled".to_string()),
            result = fetch => result.map_err(|e| format!("mempool fetch failed: {e}")),
        }
    }

    fn emit(&self, node: &str, kind: SyncEventKind) {
        let _ = self.event_sender.send(SyncEvent::new(node, kind));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use poolsync_provider::MockNodeRpc;
    use poolsync_types::{NodeId, RawTransaction};

    use super::*;

    fn ids(txids: &[&str]) -> Vec<TxId> {
        txids.iter().map(|t| TxId::from(*t)).collect()
    }

    /// A node holding `mempool` that accepts any transaction
    fn node(mempool: &[&str]) -> MockNodeRpc {
        let mempool = ids(mempool);
        let mut rpc = MockNodeRpc::new();
        rpc.expect_get_raw_mempool()
            .returning(move || Ok(mempool.clone()));
        rpc.expect_get_raw_transaction()
            .returning(|txid| Ok(RawTransaction::new(txid.as_str().as_bytes().to_vec())));
        rpc.expect_send_raw_transaction()
            .returning(|tx| Ok(TxId::new(String::from_utf8(tx.as_bytes().to_vec()).unwrap())));
        rpc
    }

    fn task(
        rpcs: Vec<MockNodeRpc>,
        args: Args,
    ) -> (SyncTask<MockNodeRpc>, broadcast::Receiver<SyncEvent>) {
        let nodes = rpcs
            .into_iter()
            .enumerate()
            .map(|(i, rpc)| SyncNode::new(NodeId(i), format!("node{}", i + 1), rpc))
            .collect();
        let (event_sender, event_receiver) = broadcast::channel(1000);
        (SyncTask::new(args, nodes, event_sender), event_receiver)
    }

    fn no_retries() -> Args {
        Args {
            fetch_retry: RetryOpts {
                max_attempts: 1,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn drain(mut events: broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
        let mut all = vec![];
        while let Ok(event) = events.try_recv() {
            all.push(event);
        }
        all
    }

    #[tokio::test]
    async fn test_three_nodes_reconcile() {
        let (task, events) = task(
            vec![node(&["tx1", "tx2"]), node(&["tx2", "tx3"]), node(&[])],
            Args::default(),
        );

        let report = task.run(CancellationToken::new()).await;

        assert!(report.is_complete());
        assert_eq!(report.nodes.len(), 3);
        let resolved: Vec<_> = report.nodes.iter().map(|n| n.resolved).collect();
        assert_eq!(resolved, vec![1, 1, 3]);
        let node3 = report.node(NodeId(2)).unwrap();
        assert_eq!(node3.outcome, NodeOutcome::Converged);
        assert_eq!(node3.passes, 1);

        let sources: HashMap<String, String> = drain(events)
            .into_iter()
            .filter(|event| event.node == "node3")
            .filter_map(|event| match event.kind {
                SyncEventKind::TransactionResolved { txid, source, .. } => {
                    Some((txid.to_string(), source))
                }
                _ => None,
            })
            .collect();
        assert_eq!(sources.len(), 3);
        assert_eq!(sources["tx1"], "node1");
        assert_eq!(sources["tx2"], "node1");
        assert_eq!(sources["tx3"], "node2");
    }

    #[tokio::test]
    async fn test_failed_fetch_excludes_node() {
        let mut down = MockNodeRpc::new();
        down.expect_get_raw_mempool()
            .times(1)
            .returning(|| Err(ProviderError::Unreachable("connection refused".to_string())));
        down.expect_send_raw_transaction().never();
        let (task, events) = task(
            vec![node(&["tx1"]), down, node(&["tx2"])],
            no_retries(),
        );

        let report = task.run(CancellationToken::new()).await;

        assert!(!report.is_complete());
        assert!(matches!(
            report.node(NodeId(1)).unwrap().outcome,
            NodeOutcome::Excluded(_)
        ));
        for id in [NodeId(0), NodeId(2)] {
            let node = report.node(id).unwrap();
            assert_eq!(node.outcome, NodeOutcome::Converged);
            assert_eq!(node.resolved, 1);
        }
        assert!(drain(events).iter().any(|event| event.node == "node2"
            && matches!(event.kind, SyncEventKind::NodeExcluded { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_fetch_failure_is_retried() {
        let mut flaky = MockNodeRpc::new();
        let mut seq = mockall::Sequence::new();
        flaky
            .expect_get_raw_mempool()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(ProviderError::Timeout));
        flaky
            .expect_get_raw_mempool()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![TxId::from("tx1")]));
        flaky.expect_get_raw_transaction()
            .returning(|txid| Ok(RawTransaction::new(txid.as_str().as_bytes().to_vec())));
        let (task, _events) = task(vec![flaky, node(&[])], Args::default());

        let report = task.run(CancellationToken::new()).await;

        assert!(report.is_complete());
        assert_eq!(report.node(NodeId(1)).unwrap().resolved, 1);
    }

    #[tokio::test]
    async fn test_skip_empty_targets() {
        let mut empty = MockNodeRpc::new();
        empty.expect_get_raw_mempool().returning(|| Ok(vec![]));
        empty.expect_send_raw_transaction().never();
        let (task, _events) = task(
            vec![node(&["tx1"]), empty, node(&["tx2"])],
            Args {
                skip_empty_targets: true,
                ..Default::default()
            },
        );

        let report = task.run(CancellationToken::new()).await;

        assert!(report.is_complete());
        assert_eq!(report.node(NodeId(1)).unwrap().outcome, NodeOutcome::Skipped);
        assert_eq!(report.node(NodeId(0)).unwrap().resolved, 1);
        assert_eq!(report.node(NodeId(2)).unwrap().resolved, 1);
    }

    #[tokio::test]
    async fn test_cancelled_run() {
        let mut rpc = MockNodeRpc::new();
        rpc.expect_get_raw_mempool().returning(|| Ok(vec![]));
        rpc.expect_send_raw_transaction().never();
        let (task, _events) = task(vec![node(&["tx1"]), rpc], Args::default());

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let report = task.run(shutdown).await;

        assert!(!report.is_complete());
        for node in &report.nodes {
            assert!(!node.outcome.is_complete(), "{} completed", node.node);
        }
    }
}
