// SPDX-License-Identifier: Apache-2.0

//! Identifier and query safety layer
//!
//! Every statement the engine assembles against an unknown schema is built
//! from two kinds of material, kept strictly apart: identifier text (table
//! and column names, escaped here and interpolated) and data values (always
//! bound as parameters, never interpolated). This module is the single
//! place identifiers are escaped.

use crate::engine::error::{EngineError, EngineResult};

/// PostgreSQL truncates identifiers beyond this byte length; anything longer
/// in caller input cannot name a real column and is rejected outright.
const MAX_IDENT_BYTES: usize = 63;

/// Validates a raw identifier before it is allowed anywhere near a statement.
///
/// Rejects rather than sanitizes: an empty name, an embedded NUL, or an
/// over-long name is caller error, not something to silently repair.
pub fn validate_ident(name: &str) -> EngineResult<()> {
    if name.is_empty() {
        return Err(EngineError::validation("identifier must not be empty"));
    }
    if name.contains('\0') {
        return Err(EngineError::validation(
            "identifier must not contain NUL bytes",
        ));
    }
    if name.len() > MAX_IDENT_BYTES {
        return Err(EngineError::validation(format!(
            "identifier exceeds {} bytes: {:?}",
            MAX_IDENT_BYTES, name
        )));
    }
    Ok(())
}

/// Returns a safely double-quoted form of an identifier, with embedded
/// quote characters doubled.
pub fn quote_ident(name: &str) -> EngineResult<String> {
    validate_ident(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quoted `"table"."column"`-style pair for a table in the default schema.
pub fn quote_qualified(schema: &str, table: &str) -> EngineResult<String> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(table)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_identifiers() {
        assert_eq!(quote_ident("users").unwrap(), "\"users\"");
        assert_eq!(quote_ident("full name").unwrap(), "\"full name\"");
    }

    #[test]
    fn doubles_embedded_quotes() {
        assert_eq!(quote_ident("user\"name").unwrap(), "\"user\"\"name\"");
        // A closing-quote injection attempt stays inert inside the quotes.
        assert_eq!(
            quote_ident("x\"; DROP TABLE users; --").unwrap(),
            "\"x\"\"; DROP TABLE users; --\""
        );
    }

    #[test]
    fn rejects_malformed_identifiers() {
        assert!(quote_ident("").is_err());
        assert!(quote_ident("bad\0name").is_err());
        assert!(quote_ident(&"x".repeat(64)).is_err());
        assert!(quote_ident(&"x".repeat(63)).is_ok());
    }

    #[test]
    fn qualified_pair() {
        assert_eq!(
            quote_qualified("public", "users").unwrap(),
            "\"public\".\"users\""
        );
    }
}
