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

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]
//! Mempool reconciliation across a fixed set of nodes.
//!
//! A run snapshots every node's mempool, builds the union of all pending
//! transactions, and then drives each node towards that union independently.

mod aggregate;
pub use aggregate::{MempoolSnapshot, UnionPool};

mod diff;
pub use diff::missing_transactions;

mod driver;
pub use driver::{ConvergenceDriver, DriverSettings};

mod emit;
pub use emit::{SyncEvent, SyncEventKind};

mod node;
pub use node::SyncNode;

mod report;
pub use report::{FailureReason, NodeFailure, NodeOutcome, NodeReport, SyncReport, TxFailure};

mod task;
pub use task::{Args as SyncTaskArgs, SyncTask};
