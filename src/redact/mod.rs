// SPDX-License-Identifier: Apache-2.0

//! Redaction Strategy Engine
//!
//! Pure functions computing the replacement value for each strategy. The
//! target driver binds these as parameters; nothing here touches SQL text.
//!
//! Compatibility note: the pseudonym prefix, digest algorithm, and
//! concatenation order of `hash_replacement` are a fixed wire contract.
//! Changing any of them breaks verification of previously issued
//! pseudonyms.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Fixed literal prefix for HASH pseudonyms.
const PSEUDONYM_PREFIX: &str = "AGS-v3-";

/// Prefix for MASK replacements that retain a 4-character tail.
const MASK_PREFIX: &str = "***-***-";

/// Replacement for values too short to keep any tail.
const FULL_MASK: &str = "****";

/// The transformation applied to one column during erasure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// Column is not PII; leave untouched and do not suggest redaction.
    Ignore,
    /// Column is operationally required (ids, timestamps); never redact.
    Preserve,
    /// Irreversible salted pseudonym.
    Hash,
    /// Fixed prefix plus the last four characters.
    Mask,
    /// Destroy the local part, keep the domain.
    EmailMask,
}

impl Strategy {
    /// Strategies that actually mutate the stored value.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Strategy::Hash | Strategy::Mask | Strategy::EmailMask)
    }
}

/// Caller-confirmed rule: one column, one strategy. A job carries one list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionRule {
    pub column: String,
    pub strategy: Strategy,
}

/// Per-job random salt. Generated once at job start, shared by every record
/// in the job, discarded with the job. Re-running a job therefore yields
/// different pseudonyms for the same original values.
#[derive(Debug, Clone)]
pub struct JobSalt(String);

impl JobSalt {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// Fixed salt for tests and pseudonym verification tooling.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// HASH: `prefix + lowercase-hex sha256(pepper ‖ salt ‖ value)`.
///
/// Deterministic within a process for fixed (pepper, salt, value): every
/// record of one column within one job that shares an original value
/// receives the same pseudonym.
pub fn hash_replacement(pepper: &str, salt: &JobSalt, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pepper.as_bytes());
    hasher.update(salt.as_str().as_bytes());
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", PSEUDONYM_PREFIX, hex)
}

/// MASK: keep the last four characters when there is anything left to hide,
/// otherwise the full-mask token.
pub fn mask_replacement(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 4 {
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}", MASK_PREFIX, tail)
    } else {
        FULL_MASK.to_string()
    }
}

/// EMAIL_MASK: `REDACTED_` + first 6 hex chars of a fast hash of the whole
/// original value, then the substring from `@` through the end. The domain
/// survives; the local part does not. Values without an `@` lose everything
/// but the hash token.
pub fn email_mask_replacement(value: &str) -> String {
    let digest = xxhash_rust::xxh3::xxh3_64(value.as_bytes());
    let hex = format!("{:016x}", digest);
    let token = &hex[..6];
    match value.find('@') {
        Some(idx) => format!("REDACTED_{}{}", token, &value[idx..]),
        None => format!("REDACTED_{}", token),
    }
}

/// Computes the replacement for one column value, or `None` when the
/// strategy performs no mutation (the caller logs and skips those).
pub fn replacement_for(
    strategy: Strategy,
    pepper: &str,
    salt: &JobSalt,
    original: &str,
) -> Option<String> {
    match strategy {
        Strategy::Hash => Some(hash_replacement(pepper, salt, original)),
        Strategy::Mask => Some(mask_replacement(original)),
        Strategy::EmailMask => Some(email_mask_replacement(original)),
        Strategy::Ignore | Strategy::Preserve => None,
    }
}
