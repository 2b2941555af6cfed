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

//! Transaction identifiers and payloads as exchanged with nodes.

use std::fmt::{self, Debug, Display, Formatter};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of a transaction, as reported by a node's mempool.
///
/// Opaque to the sync engine: two ids are the same transaction if and only if
/// they compare equal, regardless of which node reported them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    /// Create a new transaction id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TxId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for TxId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for TxId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Serialized transaction bytes.
///
/// Nodes exchange these as hex strings, which is also the serde representation.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RawTransaction(Vec<u8>);

impl RawTransaction {
    /// Wrap raw transaction bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Decode a transaction from its hex encoding. A `0x` prefix is accepted.
    pub fn from_hex(hex: &str) -> Result<Self, const_hex::FromHexError> {
        const_hex::decode(hex).map(Self)
    }

    /// Hex encoding of the transaction, without a prefix
    pub fn to_hex(&self) -> String {
        const_hex::encode(&self.0)
    }

    /// The raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Size of the transaction in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Transactions can be large, so only print the size.
impl Debug for RawTransaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "RawTransaction({} bytes)", self.0.len())
    }
}

impl Serialize for RawTransaction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for RawTransaction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex = <String>::deserialize(deserializer)?;
        Self::from_hex(&hex).map_err(de::Error::custom)
    }
}
