// Digest utilities for stash keys.
// Condenses function identity and call arguments into fixed-length hex strings.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;

use super::canonical::to_canonical_bytes;

/// Identity of a stashed function: its qualified name and a digest of its source.
///
/// Editing the function's source yields a new digest, so results stored by the
/// old definition are never returned for the new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionId {
    qualname: String,
    source_digest: String,
}

impl FunctionId {
    /// Build an identity from a qualified name and the function's source text.
    pub fn new(qualname: impl Into<String>, source: &str) -> Self {
        Self {
            qualname: qualname.into(),
            source_digest: digest_source(source),
        }
    }

    /// Build an identity from a precomputed source digest.
    pub fn from_digest(qualname: impl Into<String>, source_digest: impl Into<String>) -> Self {
        Self {
            qualname: qualname.into(),
            source_digest: source_digest.into(),
        }
    }

    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    pub fn source_digest(&self) -> &str {
        &self.source_digest
    }
}

/// Lowercase hex SHA-256 of a function's source text.
pub fn digest_source(source: &str) -> String {
    format!("{:x}", Sha256::digest(source.as_bytes()))
}

/// Lowercase hex SHA-256 of call arguments.
///
/// Arguments are hashed in their canonical encoding, so struct fields and map
/// entries are digested in sorted order regardless of declaration or
/// insertion order.
pub fn digest_args<A: Serialize + ?Sized>(args: &A) -> Result<String> {
    let canonical = to_canonical_bytes(args)?;
    Ok(format!("{:x}", Sha256::digest(&canonical)))
}
