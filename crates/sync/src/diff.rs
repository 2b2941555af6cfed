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

use std::collections::HashSet;

use poolsync_types::TxId;

use crate::UnionPool;

/// Transactions in `pool` that are not in `mempool`, in pool order.
pub fn missing_transactions(mempool: &[TxId], pool: &UnionPool) -> Vec<TxId> {
    let have: HashSet<&TxId> = mempool.iter().collect();
    pool.items()
        .iter()
        .filter(|txid| !have.contains(txid))
        .cloned()
        .collect()
}
