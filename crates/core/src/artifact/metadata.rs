//! Identification of executing code blobs.
//!
//! Deployed bytecode conventionally ends with a CBOR-encoded metadata map
//! followed by a two-byte big-endian length. The map carries the compiler's
//! identifying digest of the compilation (`ipfs`, or `bzzr1`/`bzzr0` for
//! older compilers), which is the key the artifact manager indexes deployed
//! contracts by. Initcode carries no such trailer; creation frames are keyed
//! by a plain keccak digest of the observed initcode instead.

use alloy_primitives::{keccak256, Bytes, B256};
use ciborium::value::Value;

/// Metadata-map keys carrying the compilation digest, in preference order.
const DIGEST_KEYS: [&str; 3] = ["ipfs", "bzzr1", "bzzr0"];

/// Identifying hash of the code executing at a step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodeHash {
    /// Compilation digest extracted from the CBOR metadata trailer of
    /// deployed bytecode.
    Metadata(Bytes),
    /// Keccak-256 of initcode observed at a CREATE/CREATE2.
    Creation(B256),
}

impl CodeHash {
    /// Hash for a creation-code blob.
    pub fn for_creation(initcode: &[u8]) -> Self {
        Self::Creation(keccak256(initcode))
    }

    /// Hash for a deployed-code blob; `None` when the metadata trailer is
    /// absent or malformed.
    pub fn for_deployed(code: &[u8]) -> Option<Self> {
        metadata_hash(code).map(Self::Metadata)
    }
}

/// Extracts the compilation digest from the CBOR metadata trailer of
/// deployed bytecode.
pub fn metadata_hash(code: &[u8]) -> Option<Bytes> {
    if code.len() < 2 {
        return None;
    }

    let cbor_len = u16::from_be_bytes([code[code.len() - 2], code[code.len() - 1]]) as usize;
    if cbor_len == 0 || cbor_len + 2 > code.len() {
        return None;
    }

    let blob = &code[code.len() - 2 - cbor_len..code.len() - 2];
    let value: Value = match ciborium::de::from_reader(blob) {
        Ok(value) => value,
        Err(err) => {
            trace!(%err, "malformed metadata trailer");
            return None;
        }
    };

    let Value::Map(entries) = value else { return None };
    for key in DIGEST_KEYS {
        for (entry_key, entry_value) in &entries {
            match (entry_key, entry_value) {
                (Value::Text(text), Value::Bytes(digest)) if text == key => {
                    return Some(Bytes::copy_from_slice(digest));
                }
                _ => {}
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_trailer(code: &[u8], entries: Vec<(Value, Value)>) -> Vec<u8> {
        let mut blob = Vec::new();
        ciborium::ser::into_writer(&Value::Map(entries), &mut blob).unwrap();

        let mut out = code.to_vec();
        let len = blob.len() as u16;
        out.extend_from_slice(&blob);
        out.extend_from_slice(&len.to_be_bytes());
        out
    }

    #[test]
    fn test_extracts_ipfs_digest() {
        let digest = vec![0xaa; 34];
        let code = with_trailer(
            &[0x5b, 0x00],
            vec![
                (Value::Text("ipfs".into()), Value::Bytes(digest.clone())),
                (Value::Text("solc".into()), Value::Bytes(vec![0, 8, 20])),
            ],
        );

        assert_eq!(metadata_hash(&code), Some(Bytes::from(digest)));
    }

    #[test]
    fn test_extracts_legacy_bzzr_digest() {
        let digest = vec![0x11; 32];
        let code = with_trailer(
            &[0x00],
            vec![(Value::Text("bzzr0".into()), Value::Bytes(digest.clone()))],
        );

        assert_eq!(metadata_hash(&code), Some(Bytes::from(digest)));
    }

    #[test]
    fn test_rejects_malformed_trailers() {
        // Too short for a length suffix.
        assert_eq!(metadata_hash(&[0x00]), None);
        // Length pointing past the start of the code.
        assert_eq!(metadata_hash(&[0x5b, 0x00, 0xff, 0xff]), None);
        // Not CBOR.
        assert_eq!(metadata_hash(&[0x5b, 0xff, 0xff, 0xff, 0x00, 0x03]), None);
        // Valid CBOR without a digest entry.
        let code = with_trailer(&[0x00], vec![(Value::Text("solc".into()), Value::Bytes(vec![0]))]);
        assert_eq!(metadata_hash(&code), None);
    }

    #[test]
    fn test_creation_hash_is_stable() {
        let initcode = [0x60, 0x00, 0x60, 0x00, 0xf3];
        assert_eq!(CodeHash::for_creation(&initcode), CodeHash::for_creation(&initcode));
        assert_ne!(CodeHash::for_creation(&initcode), CodeHash::for_creation(&[0x00]));
    }
}
