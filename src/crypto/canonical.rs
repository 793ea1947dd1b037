//! Deterministic snapshot canonicalization and result signatures.
//!
//! The result signature is a pure function of the ranking snapshot: no
//! clock, seed, or storage representation participates. Canonicalization is
//! RFC 8785 (JCS) via `serde_json_canonicalizer`:
//! - keys sorted lexicographically by UTF-8 bytes
//! - ES6 number serialization (1.0 → 1, -0 → 0)
//! - no insignificant whitespace
//!
//! Finalize and replay verification both go through [`result_signature`], so
//! the write and verify paths cannot diverge.

use sha2::{Digest, Sha256};

use crate::infra::{CoreError, Result};

/// Domain prefix for result signatures
pub const DOMAIN_RESULT_SIG: &[u8] = b"CASEVAULT_RESULT_SIG_V1";

/// Canonical string form of a snapshot per RFC 8785.
///
/// Fails only for values JCS cannot represent (non-finite floats); a
/// `serde_json::Value` built from valid JSON always canonicalizes.
pub fn canonicalize_snapshot(value: &serde_json::Value) -> Result<String> {
    serde_json_canonicalizer::to_string(value)
        .map_err(|e| CoreError::Canonicalization(e.to_string()))
}

/// Compute the result signature for a ranking snapshot.
///
/// signature = hex(SHA-256(DOMAIN_RESULT_SIG || JCS(snapshot)))
pub fn result_signature(snapshot: &serde_json::Value) -> Result<String> {
    let canonical = canonicalize_snapshot(snapshot)?;

    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_RESULT_SIG);
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
