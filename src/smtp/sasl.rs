//! SASL PLAIN decoding (RFC 4616).
//!
//! The mechanism data is `authzid NUL authcid NUL passwd`, base64 encoded
//! on the wire. The authorization identity must be absent or equal to the
//! authentication identity; impersonation is not supported.

use base64::Engine;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SaslError {
    #[error("invalid base64 encoding")]
    Encoding,

    #[error("malformed PLAIN response")]
    Malformed,

    #[error("username is mandatory")]
    EmptyUsername,

    #[error("impersonating another user is not supported")]
    Impersonation,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Decodes one base64 PLAIN response into credentials.
pub fn auth_plain(data: &str) -> Result<Credentials, SaslError> {
    // Clients disagree on padding; accept both.
    let trimmed = data.trim().trim_end_matches('=');
    let bytes = base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(trimmed)
        .map_err(|_| SaslError::Encoding)?;

    let mut fields = bytes.split(|b| *b == 0);
    let (authz, user, pass) = match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(a), Some(u), Some(p), None) => (a, u, p),
        _ => return Err(SaslError::Malformed),
    };

    if !authz.is_empty() && authz != user {
        return Err(SaslError::Impersonation);
    }
    if user.is_empty() {
        return Err(SaslError::EmptyUsername);
    }

    let username = std::str::from_utf8(user).map_err(|_| SaslError::Malformed)?;
    let password = std::str::from_utf8(pass).map_err(|_| SaslError::Malformed)?;

    Ok(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}
