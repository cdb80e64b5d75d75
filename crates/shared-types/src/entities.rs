//! # Core Domain Entities
//!
//! - **Transaction**: opaque byte payload submitted by the application.
//! - **Block**: ordered batch of transactions agreed by consensus.
//! - **StateDigest**: 32-byte fingerprint of state after applying a block.
//!
//! Byte payloads travel as lowercase hex strings when serialized.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use sha3::{Digest, Keccak256};

use crate::errors::DecodeError;

/// A 32-byte hash (Keccak-256).
pub type Hash = [u8; 32];

/// Keccak-256 of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Decode a hex string, accepting an optional `0x` prefix.
pub fn decode_hex(input: &str) -> Result<Vec<u8>, DecodeError> {
    let trimmed = input.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(digits).map_err(|e| DecodeError::InvalidHex(e.to_string()))
}

// =============================================================================
// TRANSACTION
// =============================================================================

/// An opaque transaction payload.
///
/// Ownership moves from the application service, through the engine, into
/// the consensus proxy. Nothing in this workspace interprets the bytes.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transaction(#[serde_as(as = "Hex")] Vec<u8>);

impl Transaction {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keccak-256 of the payload. Used for receipts and log correlation.
    pub fn hash(&self) -> Hash {
        keccak256(&self.0)
    }
}

impl From<Vec<u8>> for Transaction {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Transaction {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for Transaction {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

// =============================================================================
// BLOCK
// =============================================================================

/// Contents of a committed block as delivered by consensus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockBody {
    /// Height of the block in the committed sequence.
    pub index: u64,
    /// Consensus round in which the block's events were received.
    #[serde(default)]
    pub round_received: u64,
    /// Transactions in consensus order.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// A committed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Block {
    pub body: BlockBody,
}

impl Block {
    pub fn new(index: u64, round_received: u64, transactions: Vec<Transaction>) -> Self {
        Self {
            body: BlockBody {
                index,
                round_received,
                transactions,
            },
        }
    }

    pub fn index(&self) -> u64 {
        self.body.index
    }

    pub fn round_received(&self) -> u64 {
        self.body.round_received
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.body.transactions
    }

    pub fn tx_count(&self) -> usize {
        self.body.transactions.len()
    }
}

// =============================================================================
// STATE DIGEST
// =============================================================================

/// Fingerprint of the post-application state.
///
/// Returned verbatim to consensus, which folds it into the next block's
/// metadata so that replicas can cross-check their state.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StateDigest(#[serde_as(as = "Hex")] Hash);

impl StateDigest {
    pub const LEN: usize = 32;

    pub const fn new(bytes: Hash) -> Self {
        Self(bytes)
    }

    /// Digest of the empty state before any block has been applied.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(input: &str) -> Result<Self, DecodeError> {
        let bytes = decode_hex(input)?;
        let actual = bytes.len();
        let array: Hash = bytes.try_into().map_err(|_| DecodeError::InvalidLength {
            expected: Self::LEN,
            actual,
        })?;
        Ok(Self(array))
    }
}

impl From<Hash> for StateDigest {
    fn from(bytes: Hash) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for StateDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StateDigest({})", self.to_hex())
    }
}

impl std::fmt::Display for StateDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}
