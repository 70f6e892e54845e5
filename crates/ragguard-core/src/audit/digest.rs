//! One-way digests for identifiers that must not appear in audit records

use sha2::{Digest, Sha256};

/// Keyed SHA-256 digest, hex encoded.
///
/// With a key configured, digests of low-entropy values (client addresses)
/// cannot be reversed by enumerating the input space.
#[derive(Clone, Default)]
pub struct AuditDigest {
    key: Option<Vec<u8>>,
}

impl AuditDigest {
    pub fn new(key: Option<&str>) -> Self {
        Self {
            key: key.filter(|k| !k.is_empty()).map(|k| k.as_bytes().to_vec()),
        }
    }

    pub fn digest(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        if let Some(ref key) = self.key {
            hasher.update(key);
            hasher.update([0u8]);
        }
        hasher.update(value.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl std::fmt::Debug for AuditDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditDigest")
            .field("keyed", &self.key.is_some())
            .finish()
    }
}
