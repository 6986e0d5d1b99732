//! Ledger records and chain digests
//!
//! Chain invariant: `chain(n) = SHA-256(payload_digest(n) || chain(n-1))`,
//! with a fixed genesis seed standing in for `chain(-1)`.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

/// Digest width in bytes (SHA-256)
pub const DIGEST_LEN: usize = 32;

/// A raw SHA-256 digest
pub type Digest = [u8; DIGEST_LEN];

/// Seed chained into record 0
pub fn genesis_seed() -> Digest {
    Sha256::digest(b"parley-ledger-genesis-v1").into()
}

/// Digest of a record payload
pub fn payload_digest(payload: &[u8]) -> Digest {
    Sha256::digest(payload).into()
}

/// Chain digest over (payload digest || previous chain digest)
pub fn chain_digest(payload_digest: &Digest, prev_chain: &Digest) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(payload_digest);
    hasher.update(prev_chain);
    hasher.finalize().into()
}

/// Render a digest as lowercase hex
pub fn to_hex(digest: &Digest) -> String {
    use std::fmt::Write;
    digest.iter().fold(String::with_capacity(64), |mut s, b| {
        let _ = write!(s, "{:02x}", b);
        s
    })
}

/// Parse a 64-char lowercase hex digest
pub fn from_hex(s: &str) -> Option<Digest> {
    if s.len() != DIGEST_LEN * 2 {
        return None;
    }
    let mut out = [0u8; DIGEST_LEN];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let hi = (chunk[0] as char).to_digit(16)?;
        let lo = (chunk[1] as char).to_digit(16)?;
        out[i] = ((hi << 4) | lo) as u8;
    }
    Some(out)
}

/// The atomic unit of the audit ledger
///
/// Immutable once appended. Sequence numbers are strictly increasing and
/// gapless per ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    /// Position in the ledger, starting at 0
    pub sequence: u64,

    /// Opaque payload bytes (a serialized consent record, TRS snapshot,
    /// or friction outcome; the ledger does not look inside)
    pub payload: Vec<u8>,

    /// SHA-256 of the payload
    pub payload_digest: Digest,

    /// SHA-256 over (payload digest || previous record's chain digest)
    pub chain_digest: Digest,
}

impl LedgerRecord {
    /// Build the record that follows `prev_chain` at `sequence`
    pub fn chained(sequence: u64, payload: Vec<u8>, prev_chain: &Digest) -> Self {
        let payload_digest = payload_digest(&payload);
        let chain_digest = chain_digest(&payload_digest, prev_chain);
        Self {
            sequence,
            payload,
            payload_digest,
            chain_digest,
        }
    }

    /// Does the stored payload digest match the stored payload?
    pub fn payload_intact(&self) -> bool {
        payload_digest(&self.payload) == self.payload_digest
    }

    /// Does the stored chain digest follow from `prev_chain`?
    pub fn chains_from(&self, prev_chain: &Digest) -> bool {
        chain_digest(&self.payload_digest, prev_chain) == self.chain_digest
    }
}

/// Wire/file form of a record: hex digests, base64 payload
///
/// Used by the JSON-lines store and the CLI's `--json` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedRecord {
    pub sequence: u64,
    pub payload_digest: String,
    pub chain_digest: String,
    pub payload: String,
}

impl From<&LedgerRecord> for EncodedRecord {
    fn from(record: &LedgerRecord) -> Self {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        Self {
            sequence: record.sequence,
            payload_digest: to_hex(&record.payload_digest),
            chain_digest: to_hex(&record.chain_digest),
            payload: STANDARD.encode(&record.payload),
        }
    }
}

impl TryFrom<EncodedRecord> for LedgerRecord {
    type Error = String;

    fn try_from(encoded: EncodedRecord) -> Result<Self, Self::Error> {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        let payload_digest =
            from_hex(&encoded.payload_digest).ok_or_else(|| "bad payload digest hex".to_string())?;
        let chain_digest =
            from_hex(&encoded.chain_digest).ok_or_else(|| "bad chain digest hex".to_string())?;
        let payload = STANDARD
            .decode(&encoded.payload)
            .map_err(|e| format!("bad payload base64: {}", e))?;
        Ok(Self {
            sequence: encoded.sequence,
            payload,
            payload_digest,
            chain_digest,
        })
    }
}
