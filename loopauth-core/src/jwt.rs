//! Compact JWT decoding.
//!
//! Tokens are split into header, payload and signature without verifying the
//! signature. Decoded claims are informational only and must not be trusted
//! for authorization decisions.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{AuthError, Result};

/// A decoded, unverified JSON Web Token.
///
/// The encoded form is kept verbatim; it is the value sent to the provider
/// and to downstream APIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawJwt")]
pub struct Jwt {
    /// Decoded JOSE header.
    pub header: Map<String, Value>,
    /// Decoded claims.
    pub payload: Map<String, Value>,
    /// Signature segment, still base64url-encoded.
    pub signature: String,
    /// The complete token as received.
    pub encoded: String,
}

impl Jwt {
    /// Decode a compact JWT.
    pub fn decode(encoded: &str) -> Result<Self> {
        let parts: Vec<&str> = encoded.split('.').collect();
        if parts.len() != 3 {
            return Err(AuthError::MalformedToken(format!(
                "expected 3 segments, got {}",
                parts.len()
            )));
        }

        Ok(Self {
            header: decode_segment("header", parts[0])?,
            payload: decode_segment("payload", parts[1])?,
            signature: parts[2].to_string(),
            encoded: encoded.to_string(),
        })
    }

    /// Get a string claim from the payload.
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Value::as_str)
    }

    /// The `exp` claim, if present.
    pub fn expires_at(&self) -> Option<i64> {
        self.payload.get("exp").and_then(Value::as_i64)
    }

    /// The `alg` header, if present.
    pub fn algorithm(&self) -> Option<&str> {
        self.header.get("alg").and_then(Value::as_str)
    }
}

impl std::str::FromStr for Jwt {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

fn decode_segment(name: &str, segment: &str) -> Result<Map<String, Value>> {
    // Some issuers pad their segments; the no-pad engine rejects '='.
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(format!("{name} is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("{name} is not a JSON object: {e}")))
}

/// On-disk shape of a [`Jwt`].
///
/// The encoded form is authoritative; the stored header and payload must
/// agree with it.
#[derive(Deserialize)]
struct RawJwt {
    header: Map<String, Value>,
    payload: Map<String, Value>,
    signature: String,
    encoded: String,
}

impl TryFrom<RawJwt> for Jwt {
    type Error = AuthError;

    fn try_from(raw: RawJwt) -> Result<Self> {
        let jwt = Jwt::decode(&raw.encoded)?;
        if jwt.header != raw.header || jwt.payload != raw.payload || jwt.signature != raw.signature {
            return Err(AuthError::MalformedToken(
                "stored segments do not match the encoded token".to_string(),
            ));
        }
        Ok(jwt)
    }
}
