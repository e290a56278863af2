//! Engine API JWT material.
//!
//! Execution and consensus nodes authenticate the engine API with a shared
//! 32-byte secret. The secret is written to a file as `0x`-prefixed hex so
//! every binary can be pointed at the same path, and in-process clients sign
//! short-lived HS256 tokens with it.

use crate::error::{OrchestratorError, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use rand::RngCore;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;

/// Length of the shared secret in bytes.
pub const SECRET_LEN: usize = 32;

/// Shared engine API secret.
#[derive(Clone, PartialEq, Eq)]
pub struct JwtSecret([u8; SECRET_LEN]);

#[derive(Debug, Serialize)]
struct Claims {
    iat: u64,
}

impl JwtSecret {
    /// Generates a fresh random secret.
    pub fn random() -> Self {
        let mut bytes = [0u8; SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Creates a secret from raw bytes.
    pub fn from_bytes(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses the `0x`-hex file format. Surrounding whitespace is ignored.
    pub fn from_hex(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| OrchestratorError::Jwt(e.to_string()))?;
        let bytes: [u8; SECRET_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            OrchestratorError::Jwt(format!("expected {SECRET_LEN} bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Renders the secret in the file format.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Raw secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Writes the secret to `path`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_hex())?;
        Ok(())
    }

    /// Reads a secret from `path`.
    pub fn read_from(path: &Path) -> Result<Self> {
        Self::from_hex(&fs::read_to_string(path)?)
    }

    /// Signs a bearer token issued at `now` (seconds since the Unix epoch).
    pub fn bearer_token(&self, now: u64) -> Result<String> {
        let key = EncodingKey::from_secret(&self.0);
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &Claims { iat: now }, &key)
            .map_err(|e| OrchestratorError::Jwt(e.to_string()))
    }
}

impl fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JwtSecret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Decoded {
        iat: u64,
    }

    #[test]
    fn test_hex_file_format() {
        let secret = JwtSecret::from_bytes([0xab; SECRET_LEN]);
        let text = secret.to_hex();
        assert!(text.starts_with("0xabab"));
        assert_eq!(text.len(), 2 + SECRET_LEN * 2);

        assert_eq!(JwtSecret::from_hex(&format!("{text}\n")).unwrap(), secret);
        assert_eq!(JwtSecret::from_hex(&text[2..]).unwrap(), secret);
        assert!(JwtSecret::from_hex("0x1234").is_err());
        assert!(JwtSecret::from_hex("0xzz").is_err());
    }

    #[test]
    fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jwt.hex");
        let secret = JwtSecret::random();
        secret.write_to(&path).unwrap();
        assert_eq!(JwtSecret::read_from(&path).unwrap(), secret);
    }

    #[test]
    fn test_bearer_token_verifies() {
        let secret = JwtSecret::random();
        let token = secret.bearer_token(1_700_000_000).unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        let data = jsonwebtoken::decode::<Decoded>(
            &token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .unwrap();
        assert_eq!(data.claims.iat, 1_700_000_000);

        let other = JwtSecret::random();
        assert!(jsonwebtoken::decode::<Decoded>(
            &token,
            &DecodingKey::from_secret(other.as_bytes()),
            &validation,
        )
        .is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let secret = JwtSecret::from_bytes([0x11; SECRET_LEN]);
        assert_eq!(format!("{secret:?}"), "JwtSecret(..)");
    }
}
