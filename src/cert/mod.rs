//! `Certificate` and `PrivateKey` types.
//!
//! Both wrap DER-encoded bytes as handed over by the signing side. No parsing
//! happens here: verification is left to the transport layer.

use serde::Serialize;
use zeroize::Zeroize;

/// A single DER-encoded X.509 certificate.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize)]
#[serde(transparent)]
pub struct Certificate(Vec<u8>);

impl Certificate {
    /// Returns the certificate bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Certificate {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Certificate {
    fn from(der_bytes: Vec<u8>) -> Self {
        Self(der_bytes)
    }
}

impl From<&[u8]> for Certificate {
    fn from(der_bytes: &[u8]) -> Self {
        Self(der_bytes.to_vec())
    }
}

/// A DER-encoded private key.
///
/// This type is zeroized on drop and never prints its contents.
#[derive(Clone, Eq, PartialEq, Zeroize)]
#[zeroize(drop)]
pub struct PrivateKey(Vec<u8>);

impl PrivateKey {
    /// Returns the private key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for PrivateKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for PrivateKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for PrivateKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("len", &self.0.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_key_debug_hides_bytes() {
        let key = PrivateKey::from(vec![1, 2, 3]);
        assert_eq!(format!("{key:?}"), "PrivateKey { len: 3 }");
    }

    #[test]
    fn test_certificate_serializes_as_bytes() {
        let cert = Certificate::from(&b"ab"[..]);
        assert_eq!(serde_json::to_string(&cert).unwrap(), "[97,98]");
    }
}
