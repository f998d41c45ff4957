//! Identifier sanitization
//!
//! Anywhere a caller-supplied name must be interpolated into SQL text (DDL,
//! savepoints, maintenance commands), it goes through [`sanitize_identifier`]
//! first. Validation catches malice and mistakes with a clear error; the
//! quote-doubling and wrapping are defense in depth for the rare legitimate
//! edge cases. Quoted reserved words are legal in PostgreSQL, so there is no
//! keyword rejection.
//!
//! Dot-separated qualified names are rejected: callers needing a schema
//! prefix sanitize each part and join the quoted results themselves.

use crate::error::{GatewayError, GatewayResult};

/// PostgreSQL truncates identifiers beyond 63 bytes (NAMEDATALEN - 1).
const MAX_IDENTIFIER_BYTES: usize = 63;

/// Validate `name` and return it as a double-quoted SQL identifier.
pub fn sanitize_identifier(name: &str) -> GatewayResult<String> {
    if name.is_empty() {
        return Err(invalid(name, "identifier is empty"));
    }
    if name.len() > MAX_IDENTIFIER_BYTES {
        return Err(invalid(name, "identifier exceeds 63 bytes"));
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return Err(invalid(name, "identifier must start with a letter or underscore")),
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '"') {
        return Err(invalid(
            name,
            "identifier may contain only letters, digits, and underscores",
        ));
    }

    // Embedded double-quotes are legal once doubled; everything else the
    // alphabet already excluded.
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Sanitize a `schema.name` pair into a fully qualified quoted identifier.
pub fn qualified_identifier(schema: &str, name: &str) -> GatewayResult<String> {
    Ok(format!(
        "{}.{}",
        sanitize_identifier(schema)?,
        sanitize_identifier(name)?
    ))
}

fn invalid(name: &str, reason: &'static str) -> GatewayError {
    GatewayError::InvalidIdentifier {
        name: name.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert_eq!(sanitize_identifier("users").unwrap(), "\"users\"");
        assert_eq!(sanitize_identifier("_tmp_1").unwrap(), "\"_tmp_1\"");
        assert_eq!(sanitize_identifier("Order2").unwrap(), "\"Order2\"");
    }

    #[test]
    fn rejects_injection_attempts() {
        assert!(sanitize_identifier("users; DROP TABLE users--").is_err());
        assert!(sanitize_identifier("user name").is_err());
        assert!(sanitize_identifier("").is_err());
    }

    #[test]
    fn doubles_embedded_quotes() {
        assert_eq!(sanitize_identifier("user\"name").unwrap(), "\"user\"\"name\"");
    }

    #[test]
    fn rejects_qualified_names() {
        assert!(sanitize_identifier("public.users").is_err());
        assert_eq!(
            qualified_identifier("public", "users").unwrap(),
            "\"public\".\"users\""
        );
    }

    #[test]
    fn rejects_leading_digit() {
        assert!(sanitize_identifier("1users").is_err());
    }

    #[test]
    fn rejects_over_length() {
        let long = "a".repeat(64);
        assert!(sanitize_identifier(&long).is_err());
        let max = "a".repeat(63);
        assert!(sanitize_identifier(&max).is_ok());
    }

    #[test]
    fn quoted_reserved_words_pass() {
        assert_eq!(sanitize_identifier("select").unwrap(), "\"select\"");
    }
}
