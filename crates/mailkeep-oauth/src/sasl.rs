//! SASL initial responses for IMAP `AUTHENTICATE` and SMTP `AUTH`.
//!
//! - PLAIN (RFC 4616) for password accounts
//! - XOAUTH2 for token accounts

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Generates the PLAIN initial response: `base64("\0user\0password")`.
///
/// ```
/// use mailkeep_oauth::sasl::plain_response;
///
/// assert_eq!(plain_response("user", "pass"), "AHVzZXIAcGFzcw==");
/// ```
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    // empty authorization identity: act as the authenticated user
    STANDARD.encode(format!("\0{username}\0{password}"))
}

/// Generates the XOAUTH2 initial response:
/// `base64("user=<user>\x01auth=Bearer <token>\x01\x01")`.
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    STANDARD.encode(format!("user={user}\x01auth=Bearer {token}\x01\x01"))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn decode(response: &str) -> String {
        String::from_utf8(STANDARD.decode(response).unwrap()).unwrap()
    }

    #[test]
    fn test_plain() {
        assert_eq!(decode(&plain_response("bla", "pw")), "\0bla\0pw");
    }

    #[test]
    fn test_xoauth2() {
        assert_eq!(
            decode(&xoauth2_response("bla@blubb.com", "tok")),
            "user=bla@blubb.com\x01auth=Bearer tok\x01\x01"
        );
    }
}
