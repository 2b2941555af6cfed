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

use poolsync_types::NodeId;

/// A node taking part in a sync run, together with its RPC client.
#[derive(Debug)]
pub struct SyncNode<P> {
    /// Position in the configured node list
    pub id: NodeId,
    /// Name used in logs and events
    pub name: String,
    /// RPC client bound to this node
    pub rpc: Arc<P>,
}

impl<P> SyncNode<P> {
    /// Create a new node
    pub fn new(id: NodeId, name: impl Into<String>, rpc: P) -> Self {
        Self {
            id,
            name: name.into(),
            rpc: Arc::new(rpc),
        }
    }
}

impl<P> Clone for SyncNode<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            rpc: Arc::clone(&self.rpc),
        }
    }
}
