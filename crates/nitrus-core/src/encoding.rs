//! Base64 encoding and decoding.
//!
//! Standard alphabet with padding, as required by SASL PLAIN credentials.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::{Error, Result};

/// Encodes bytes as padded standard-alphabet base64.
pub fn encode(value: &[u8]) -> String {
    STANDARD.encode(value)
}

/// Decodes padded standard-alphabet base64.
pub fn decode(value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|err| Error::Malformed(format!("base64: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_known_vector() {
        assert_eq!(encode(b"hello world!"), "aGVsbG8gd29ybGQh");
    }

    #[test]
    fn decodes_known_vector() {
        assert_eq!(decode("aGVsbG8gd29ybGQh").unwrap(), b"hello world!");
    }

    #[test]
    fn round_trips_binary() {
        let data: Vec<u8> = (0..=255).collect();
        assert_eq!(decode(&encode(&data)).unwrap(), data);
    }

    #[test]
    fn rejects_invalid_input() {
        assert!(decode("not base64!").is_err());
    }

    #[test]
    fn encodes_sasl_plain_credentials() {
        let mut plain = vec![0u8];
        plain.extend_from_slice(b"alice");
        plain.push(0);
        plain.extend_from_slice(b"secret");
        assert_eq!(encode(&plain), "AGFsaWNlAHNlY3JldQ==");
    }
}
