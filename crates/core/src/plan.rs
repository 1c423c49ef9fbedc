//! Query plans and the identifiers derived from them.
//!
//! A [`Plan`] is an opaque serialized query. The core never looks inside it;
//! only its bytes matter. [`PlanHasher`] turns those bytes into a [`QueryId`],
//! which is both the result-cache key and the ticket handed back to clients.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::error::FlightdeckError;

/// Length of a [`QueryId`] digest in bytes.
pub const QUERY_ID_LEN: usize = 32;

/// Opaque, immutable serialized query plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Plan(Bytes);

impl Plan {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The plan as UTF-8 text, for backends whose plan format is textual.
    pub fn as_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Bytes> for Plan {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Plan {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Plan {
    fn from(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }
}

impl From<&'static str> for Plan {
    fn from(text: &'static str) -> Self {
        Self(Bytes::from_static(text.as_bytes()))
    }
}

/// Deterministic identifier of a plan: the SHA-256 digest of its bytes.
///
/// The external form (ticket payload) is the lowercase hex encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId([u8; QUERY_ID_LEN]);

impl QueryId {
    pub fn from_digest(digest: [u8; QUERY_ID_LEN]) -> Self {
        Self(digest)
    }

    pub fn as_bytes(&self) -> &[u8; QUERY_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the hex form produced by [`QueryId::to_hex`]. Only that exact
    /// form is accepted: lowercase, no surrounding whitespace.
    pub fn from_hex(s: &str) -> Result<Self, FlightdeckError> {
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(FlightdeckError::MalformedQueryId(format!(
                "{s:?}: hex digits must be lowercase"
            )));
        }
        let mut digest = [0u8; QUERY_ID_LEN];
        hex::decode_to_slice(s, &mut digest)
            .map_err(|e| FlightdeckError::MalformedQueryId(format!("{s:?}: {e}")))?;
        Ok(Self(digest))
    }

    /// Encode as ticket bytes (UTF-8 hex).
    pub fn to_ticket(&self) -> Bytes {
        Bytes::from(self.to_hex())
    }

    /// Decode ticket bytes produced by [`QueryId::to_ticket`].
    pub fn from_ticket(ticket: &[u8]) -> Result<Self, FlightdeckError> {
        let text = std::str::from_utf8(ticket)
            .map_err(|e| FlightdeckError::MalformedQueryId(format!("ticket is not UTF-8: {e}")))?;
        Self::from_hex(text)
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 12 hex chars is plenty to tell queries apart in logs
        write!(f, "QueryId({})", &self.to_hex()[..12])
    }
}

impl FromStr for QueryId {
    type Err = FlightdeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Content hash over plan bytes. Pure, unsalted, total.
pub struct PlanHasher;

impl PlanHasher {
    pub fn hash(plan: &Plan) -> QueryId {
        Self::hash_bytes(plan.as_bytes())
    }

    pub fn hash_bytes(bytes: &[u8]) -> QueryId {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        QueryId(hasher.finalize().into())
    }
}
