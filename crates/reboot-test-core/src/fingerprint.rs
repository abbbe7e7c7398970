//! System image fingerprints.
//!
//! A fingerprint is the 32-byte merkle root of a system image. Two devices
//! report the same fingerprint only if they run byte-identical images, so it
//! is the unit of version equality throughout the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A 32-byte system image fingerprint, hex-encoded for display.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Create a new `Fingerprint` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a fingerprint from arbitrary content using blake3.
    ///
    /// Used for synthetic images (fake devices, fixtures) where no real
    /// merkle tree is available.
    #[must_use]
    pub fn digest(content: &[u8]) -> Self {
        Self(*blake3::hash(content).as_bytes())
    }

    /// Parse a `Fingerprint` from a hex-encoded string.
    ///
    /// Surrounding whitespace is ignored, which lets callers feed in values
    /// read straight from files or command output.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or not exactly 64 characters.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let s = s.trim();
        let bytes = hex::decode(s).map_err(|_| CoreError::InvalidHex)?;
        let got = bytes.len();
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidLength { expected: 32, got })?;
        Ok(Self(arr))
    }

    /// Return the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Return the hex-encoded string representation.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Return a shortened hex prefix for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.to_hex()
    }
}

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn parse_hex() {
        let fingerprint = Fingerprint::from_hex(HEX).unwrap();
        assert_eq!(fingerprint.to_hex(), HEX);
        assert_eq!(fingerprint.as_bytes()[0], 0x01);
    }

    #[test]
    fn parse_trims_whitespace() {
        let fingerprint: Fingerprint = format!("  {HEX}\n").parse().unwrap();
        assert_eq!(fingerprint.to_hex(), HEX);
    }

    #[test]
    fn parse_invalid_hex() {
        let err = Fingerprint::from_hex("not-hex").unwrap_err();
        assert_eq!(err, CoreError::InvalidHex);
    }

    #[test]
    fn parse_wrong_length() {
        let err = Fingerprint::from_hex("abcd").unwrap_err();
        assert_eq!(err, CoreError::InvalidLength { expected: 32, got: 2 });
    }

    #[test]
    fn digest_is_deterministic() {
        assert_eq!(Fingerprint::digest(b"image-1"), Fingerprint::digest(b"image-1"));
        assert_ne!(Fingerprint::digest(b"image-1"), Fingerprint::digest(b"image-2"));
    }

    #[test]
    fn short_prefix() {
        let fingerprint = Fingerprint::from_hex(HEX).unwrap();
        assert_eq!(fingerprint.short(), "0123456789ab");
    }

    #[test]
    fn serde_as_hex_string() {
        let fingerprint = Fingerprint::from_hex(HEX).unwrap();
        let json = serde_json::to_string(&fingerprint).unwrap();
        assert_eq!(json, format!("\"{HEX}\""));

        let parsed: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, fingerprint);

        assert!(serde_json::from_str::<Fingerprint>("\"zz\"").is_err());
    }
}
