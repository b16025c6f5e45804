//! Capability tokens and the links that carry them
//!
//! A capability token is an opaque bearer credential scoping access to
//! exactly one member record. The client never verifies it: the payload is
//! decoded only to prefill the phone field, and the record service remains
//! the sole authority on whether the token is valid.

use crate::error::{Result, RosterError};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Path a link for an existing record points at.
pub const UPDATE_MEMBER_PATH: &str = "/update-member";

/// Path a link for a new record points at.
pub const NEW_MEMBER_PATH: &str = "/new-member";

/// Which issuance endpoint produced a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenPurpose {
    /// Issued by an admin for a record that already exists
    ExistingRecord,
    /// Issued through self-service for a record yet to be created
    NewRecord,
}

impl TokenPurpose {
    pub fn path(&self) -> &'static str {
        match self {
            TokenPurpose::ExistingRecord => UPDATE_MEMBER_PATH,
            TokenPurpose::NewRecord => NEW_MEMBER_PATH,
        }
    }

    fn from_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            UPDATE_MEMBER_PATH => Some(TokenPurpose::ExistingRecord),
            NEW_MEMBER_PATH => Some(TokenPurpose::NewRecord),
            _ => None,
        }
    }
}

/// Opaque bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct CapabilityToken(String);

impl CapabilityToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw token, as sent in the `Authorization` header
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix safe to log.
    pub fn fingerprint(&self) -> String {
        let prefix: String = self.0.chars().take(8).collect();
        format!("{}…", prefix)
    }

    /// Best-effort decode of the payload segment.
    ///
    /// Returns `None` for anything that is not a three-segment token with a
    /// base64 JSON payload carrying a subject. The result is informational
    /// only and never authorizes anything.
    pub fn decode(&self) -> Option<TokenClaims> {
        self.try_decode()
            .map_err(|e| tracing::debug!(token = %self.fingerprint(), "token decode skipped: {}", e))
            .ok()
    }

    /// Decode, reporting why the payload could not be read.
    pub fn try_decode(&self) -> Result<TokenClaims> {
        let mut segments = self.0.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => {
                return Err(RosterError::MalformedToken(
                    "expected three dot-separated segments".to_string(),
                ))
            }
        };

        let bytes = decode_segment(payload)?;
        let raw: Value = serde_json::from_slice(&bytes)
            .map_err(|e| RosterError::MalformedToken(format!("payload is not JSON: {}", e)))?;
        let payload: RawPayload = serde_json::from_value(raw.clone())
            .map_err(|e| RosterError::MalformedToken(format!("unexpected payload shape: {}", e)))?;

        let subject = match payload.sub {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(RosterError::MalformedToken("payload has no subject".to_string())),
        };

        Ok(TokenClaims {
            subject,
            expires_at: payload.exp,
            raw,
        })
    }
}

impl fmt::Debug for CapabilityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CapabilityToken").field(&self.fingerprint()).finish()
    }
}

/// Claims read from a token payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    /// Phone number the token was issued for
    pub subject: String,
    /// Expiry (seconds since epoch), if present; display only
    pub expires_at: Option<i64>,
    /// The whole decoded payload
    pub raw: Value,
}

#[derive(Deserialize)]
struct RawPayload {
    sub: Option<Value>,
    exp: Option<i64>,
}

fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| general_purpose::URL_SAFE.decode(segment))
        .or_else(|_| general_purpose::STANDARD.decode(segment))
        .map_err(|e| RosterError::MalformedToken(format!("payload is not base64: {}", e)))
}

/// A navigable link delivering a token to its recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityLink {
    pub purpose: TokenPurpose,
    pub token: CapabilityToken,
}

#[derive(Deserialize)]
struct LinkQuery {
    token: Option<String>,
}

impl CapabilityLink {
    pub fn new(purpose: TokenPurpose, token: CapabilityToken) -> Self {
        Self { purpose, token }
    }

    /// Path and query, e.g. `/update-member?token=...`
    pub fn path(&self) -> String {
        format!(
            "{}?token={}",
            self.purpose.path(),
            urlencoding::encode(self.token.as_str())
        )
    }

    /// Absolute link under the given origin.
    pub fn url(&self, origin: &str) -> String {
        format!("{}{}", origin.trim_end_matches('/'), self.path())
    }

    /// Shortened form for display: first 40 characters, `...`, last 20.
    pub fn abbreviated(&self, origin: &str) -> String {
        let url = self.url(origin);
        let chars: Vec<char> = url.chars().collect();
        if chars.len() <= 60 {
            return url;
        }
        let head: String = chars[..40].iter().collect();
        let tail: String = chars[chars.len() - 20..].iter().collect();
        format!("{}...{}", head, tail)
    }

    /// Read a link (absolute or path-only). The token is taken from the
    /// query string and nowhere else.
    pub fn parse(link: &str) -> Result<Self> {
        let without_scheme = match link.find("://") {
            Some(idx) => &link[idx + 3..],
            None => link,
        };
        let path_and_query = if link.contains("://") {
            without_scheme
                .find('/')
                .map(|idx| &without_scheme[idx..])
                .unwrap_or("/")
        } else {
            without_scheme
        };

        let (path, query) = path_and_query.split_once('?').unwrap_or((path_and_query, ""));
        let query = query.split('#').next().unwrap_or("");

        let purpose = TokenPurpose::from_path(path)
            .ok_or_else(|| RosterError::Validation(format!("Link desconhecido: {}", path)))?;

        let parsed: LinkQuery = serde_urlencoded::from_str(query)
            .map_err(|e| RosterError::Validation(format!("Link inválido: {}", e)))?;

        match parsed.token.filter(|t| !t.is_empty()) {
            Some(token) => Ok(Self::new(purpose, CapabilityToken::new(token))),
            None => Err(RosterError::Validation("Token não encontrado.".to_string())),
        }
    }
}
