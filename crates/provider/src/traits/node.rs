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

//! Trait for interacting with a node's mempool.

#[cfg(feature = "test-utils")]
use mockall::automock;
use poolsync_types::{RawTransaction, TxId};

use super::error::ProviderResult;

/// Access to the mempool of a single node.
///
/// Each instance is bound to one node for the lifetime of a run.
#[cfg_attr(feature = "test-utils", automock)]
#[async_trait::async_trait]
pub trait NodeRpc: Send + Sync + 'static {
    /// Ids of all transactions currently in the node's mempool
    async fn get_raw_mempool(&self) -> ProviderResult<Vec<TxId>>;

    /// Fetch the serialized form of a transaction the node knows about
    async fn get_raw_transaction(&self, txid: TxId) -> ProviderResult<RawTransaction>;

    /// Submit a serialized transaction to the node, returning its id.
    ///
    /// Rejections are reported as errors; use [`ProviderError::rejection`](crate::ProviderError::rejection)
    /// to classify them.
    async fn send_raw_transaction(&self, tx: RawTransaction) -> ProviderResult<TxId>;
}
