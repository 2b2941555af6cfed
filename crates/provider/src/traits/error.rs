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

use std::fmt::{self, Display, Formatter};

/// Bitcoin Core's error code for a transaction that is already confirmed
pub const RPC_VERIFY_ALREADY_IN_CHAIN: i64 = -27;

const MISSING_INPUTS_MESSAGES: &[&str] = &["missing inputs", "bad-txns-inputs-missingorspent"];

const ALREADY_KNOWN_MESSAGES: &[&str] = &[
    "already in block chain",
    "already in chain",
    "txn-already-known",
    "txn-already-in-mempool",
    "outputs already in utxo set",
];

/// Error enumeration for the NodeRpc trait
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The node answered with a JSON-RPC error
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message from the node
        message: String,
    },
    /// The request did not complete within the configured timeout
    #[error("request timed out")]
    Timeout,
    /// The node could not be connected to
    #[error("node unreachable: {0}")]
    Unreachable(String),
    /// Any other HTTP transport failure
    #[error(transparent)]
    Transport(reqwest::Error),
    /// The node's response could not be decoded
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Result of a provider method call
pub type ProviderResult<T> = Result<T, ProviderError>;

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Unreachable(error.to_string())
        } else {
            Self::Transport(error)
        }
    }
}

/// Why a node refused a submitted transaction.
///
/// The display strings of the first two kinds are the sentinels the sync
/// engine keys its retry policy on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// A transaction this one spends from is unknown to the node
    MissingInputs,
    /// The node already has the transaction, in its mempool or in a block
    AlreadyInChain,
    /// Any other reason
    Other,
}

impl Display for Rejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingInputs => f.write_str("missing inputs"),
            Rejection::AlreadyInChain => f.write_str("already in chain"),
            Rejection::Other => f.write_str("rejected"),
        }
    }
}

impl ProviderError {
    /// Classify this error as the result of a transaction submission.
    ///
    /// Only errors reported by the node itself can be anything other than
    /// [`Rejection::Other`].
    pub fn rejection(&self) -> Rejection {
        let ProviderError::Rpc { code, message } = self else {
            return Rejection::Other;
        };
        let message = message.to_ascii_lowercase();
        if MISSING_INPUTS_MESSAGES.iter().any(|m| message.contains(m)) {
            Rejection::MissingInputs
        } else if *code == RPC_VERIFY_ALREADY_IN_CHAIN
            || ALREADY_KNOWN_MESSAGES.iter().any(|m| message.contains(m))
        {
            Rejection::AlreadyInChain
        } else {
            Rejection::Other
        }
    }

    /// True if the node could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ProviderError::Unreachable(_))
    }

    /// True if repeating the same request might succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout | ProviderError::Unreachable(_) | ProviderError::Transport(_)
        )
    }
}
