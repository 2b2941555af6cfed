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

use std::{collections::HashSet, sync::Arc};

use futures::{stream, StreamExt};
use poolsync_provider::{NodeRpc, Rejection};
use poolsync_types::{NodeId, TxId};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    emit::{SyncEvent, SyncEventKind},
    missing_transactions,
    report::{FailureReason, NodeFailure, NodeOutcome, NodeReport, TxFailure},
    SyncNode, UnionPool,
};

/// Settings for a convergence driver
#[derive(Clone, Copy, Debug)]
pub struct DriverSettings {
    /// Maximum number of deliveries in flight within one pass.
    /// 1 delivers transactions one at a time, in pool order.
    pub delivery_concurrency: usize,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            delivery_concurrency: 1,
        }
    }
}

#[derive(Debug)]
enum Delivery {
    Resolved {
        source: String,
        already_known: bool,
    },
    Deferred,
    Failed {
        reason: FailureReason,
        source_unreachable: bool,
    },
    TargetUnreachable(String),
}

/// Delivers a node's missing transactions in passes until nothing is
/// missing or a pass stops making progress.
///
/// Transactions rejected for missing inputs are retried in the next pass, on
/// the assumption that their parent was delivered later in the same pass. Any
/// other outcome removes the transaction from the missing set for good, so the
/// set never grows and the number of passes is bounded by the depth of the
/// longest dependency chain plus one.
///
/// A pass that does not shrink the missing set ends the sync as stalled. This
/// is a heuristic: a parent that some other node only receives later in the run
/// would have made progress possible, but the driver does not wait for it.
#[derive(Debug)]
pub struct ConvergenceDriver<P> {
    target: SyncNode<P>,
    nodes: Arc<[SyncNode<P>]>,
    pool: Arc<UnionPool>,
    settings: DriverSettings,
    event_sender: broadcast::Sender<SyncEvent>,
    missing: Vec<TxId>,
    failures: Vec<TxFailure>,
    resolved: usize,
    passes: usize,
}

impl<P> ConvergenceDriver<P>
where
    P: NodeRpc,
{
    /// Create a driver for `target`, whose mempool snapshot is `mempool`.
    ///
    /// `nodes` must contain every node that can appear as a source in `pool`.
    pub fn new(
        target: SyncNode<P>,
        nodes: Arc<[SyncNode<P>]>,
        pool: Arc<UnionPool>,
        mempool: &[TxId],
        settings: DriverSettings,
        event_sender: broadcast::Sender<SyncEvent>,
    ) -> Self {
        let missing = missing_transactions(mempool, &pool);
        Self {
            target,
            nodes,
            pool,
            settings,
            event_sender,
            missing,
            failures: vec![],
            resolved: 0,
            passes: 0,
        }
    }

    /// Transactions the node still lacks
    pub fn missing(&self) -> &[TxId] {
        &self.missing
    }

    /// Run passes until the node converges, stalls or fails.
    pub async fn run(mut self, shutdown: CancellationToken) -> NodeReport {
        info!(
            "Syncing {} missing transactions to {}",
            self.missing.len(),
            self.target.name
        );

        let mut last_missing_count = self.missing.len() + 1;
        while !self.missing.is_empty() && self.missing.len() < last_missing_count {
            if shutdown.is_cancelled() {
                return self.fail(NodeFailure::Cancelled);
            }

            last_missing_count = self.missing.len();
            self.passes += 1;
            info!(
                "Starting pass {} for {} with {} pending",
                self.passes,
                self.target.name,
                self.missing.len()
            );
            self.emit(SyncEventKind::PassStarted {
                pass: self.passes,
                pending: self.missing.len(),
            });

            let outcomes = self.run_pass(&shutdown).await;
            let failure = self.apply(outcomes);
            if shutdown.is_cancelled() && !self.missing.is_empty() {
                return self.fail(NodeFailure::Cancelled);
            }
            if let Some(failure) = failure {
                return self.fail(failure);
            }
        }

        if self.missing.is_empty() {
            self.converge()
        } else {
            self.stall()
        }
    }

    /// Attempt every missing transaction once. Only completed attempts are
    /// returned; anything not attempted stays missing.
    async fn run_pass(&self, shutdown: &CancellationToken) -> Vec<(TxId, Delivery)> {
        let pending = self.missing.clone();
        let mut deliveries = std::pin::pin!(stream::iter(pending)
            .map(|txid| async move {
                let delivery = self.deliver(&txid).await;
                (txid, delivery)
            })
            .buffered(self.settings.delivery_concurrency.max(1))
            .take_until(shutdown.cancelled()));

        let mut outcomes = vec![];
        while let Some((txid, delivery)) = deliveries.next().await {
            self.report_delivery(&txid, &delivery);
            let stop = matches!(delivery, Delivery::TargetUnreachable(_));
            outcomes.push((txid, delivery));
            if stop {
                break;
            }
        }
        outcomes
    }

    async fn deliver(&self, txid: &TxId) -> Delivery {
        let Some(source) = self.pool.source(txid).and_then(|id| self.node(id)) else {
            return Delivery::Failed {
                reason: FailureReason::FetchFailed {
                    source: "unknown".to_string(),
                    error: "transaction has no source node".to_string(),
                },
                source_unreachable: false,
            };
        };

        let raw = match source.rpc.get_raw_transaction(txid.clone()).await {
            Ok(raw) => raw,
            Err(error) => {
                return Delivery::Failed {
                    source_unreachable: error.is_unreachable(),
                    reason: FailureReason::FetchFailed {
                        source: source.name.clone(),
                        error: error.to_string(),
                    },
                }
            }
        };

        match self.target.rpc.send_raw_transaction(raw).await {
            Ok(_) => Delivery::Resolved {
                source: source.name.clone(),
                already_known: false,
            },
            Err(error) if error.is_unreachable() => Delivery::TargetUnreachable(error.to_string()),
            Err(error) => match error.rejection() {
                Rejection::MissingInputs => Delivery::Deferred,
                Rejection::AlreadyInChain => Delivery::Resolved {
                    source: source.name.clone(),
                    already_known: true,
                },
                Rejection::Other => Delivery::Failed {
                    reason: FailureReason::Rejected(error.to_string()),
                    source_unreachable: false,
                },
            },
        }
    }

    fn report_delivery(&self, txid: &TxId, delivery: &Delivery) {
        let name = &self.target.name;
        match delivery {
            Delivery::Resolved {
                source,
                already_known,
            } => {
                debug!("Sent {txid} from {source} to {name} (already known: {already_known})");
                self.emit(SyncEventKind::TransactionResolved {
                    txid: txid.clone(),
                    source: source.clone(),
                    already_known: *already_known,
                });
            }
            Delivery::Deferred => {
                debug!("{name} is missing inputs for {txid}, retrying next pass");
                self.emit(SyncEventKind::TransactionDeferred { txid: txid.clone() });
            }
            Delivery::Failed { reason, .. } => {
                warn!("Failed to deliver {txid} to {name}: {reason}");
                self.emit(SyncEventKind::TransactionFailed {
                    txid: txid.clone(),
                    reason: reason.clone(),
                });
            }
            Delivery::TargetUnreachable(error) => {
                error!("Lost connection to {name} while sending {txid}: {error}");
            }
        }
    }

    /// Fold the outcomes of a pass into the node's state.
    fn apply(&mut self, outcomes: Vec<(TxId, Delivery)>) -> Option<NodeFailure> {
        let attempted = outcomes.len();
        let mut sources_unreachable = 0;
        let mut target_unreachable = None;
        let mut done = HashSet::new();

        for (txid, delivery) in outcomes {
            match delivery {
                Delivery::Resolved { .. } => {
                    self.resolved += 1;
                    done.insert(txid);
                }
                Delivery::Deferred => {}
                Delivery::Failed {
                    reason,
                    source_unreachable,
                } => {
                    if source_unreachable {
                        sources_unreachable += 1;
                    }
                    self.failures.push(TxFailure {
                        txid: txid.clone(),
                        reason,
                    });
                    done.insert(txid);
                }
                Delivery::TargetUnreachable(error) => target_unreachable = Some(error),
            }
        }
        self.missing.retain(|txid| !done.contains(txid));

        if let Some(error) = target_unreachable {
            Some(NodeFailure::Unreachable(error))
        } else if attempted > 0 && sources_unreachable == attempted && self.resolved == 0 {
            // only when the node never got anything delivered
            Some(NodeFailure::SourcesUnreachable)
        } else {
            None
        }
    }

    fn node(&self, id: NodeId) -> Option<&SyncNode<P>> {
        self.nodes.iter().find(|node| node.id == id)
    }

    fn emit(&self, kind: SyncEventKind) {
        let _ = self
            .event_sender
            .send(SyncEvent::new(self.target.name.clone(), kind));
    }

    fn converge(self) -> NodeReport {
        info!(
            "{} converged after {} passes, resolved {} transactions",
            self.target.name, self.passes, self.resolved
        );
        self.emit(SyncEventKind::NodeConverged {
            passes: self.passes,
            resolved: self.resolved,
        });
        self.into_report(NodeOutcome::Converged)
    }

    fn stall(mut self) -> NodeReport {
        warn!(
            "{} stalled after {} passes with {} transactions missing inputs",
            self.target.name,
            self.passes,
            self.missing.len()
        );
        self.failures
            .extend(self.missing.iter().map(|txid| TxFailure {
                txid: txid.clone(),
                reason: FailureReason::Unresolved,
            }));
        self.emit(SyncEventKind::NodeStalled {
            passes: self.passes,
            remaining: self.missing.clone(),
        });
        self.into_report(NodeOutcome::Stalled)
    }

    fn fail(self, failure: NodeFailure) -> NodeReport {
        error!("Sync of {} failed: {failure}", self.target.name);
        self.emit(SyncEventKind::NodeFailed {
            reason: failure.clone(),
            remaining: self.missing.len(),
        });
        self.into_report(NodeOutcome::Failed(failure))
    }

    fn into_report(self, outcome: NodeOutcome) -> NodeReport {
        NodeReport {
            id: self.target.id,
            node: self.target.name,
            outcome,
            passes: self.passes,
            resolved: self.resolved,
            failures: self.failures,
            remaining: self.missing,
        }
    }
}
