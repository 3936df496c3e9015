use sha2::{Digest, Sha256};

/// Hex characters kept from the digest when it is used as a short identifier.
pub const SHORT_DIGEST_HEX_CHARS: usize = 16;

/// SHA-256 over length-prefixed fields, so `("ab", "c")` and `("a", "bc")`
/// never collide.
#[must_use]
pub fn digest_fields(fields: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field);
    }
    hasher.finalize().into()
}

#[must_use]
pub fn short_hex_digest(fields: &[&[u8]]) -> String {
    let mut encoded = hex::encode(digest_fields(fields));
    encoded.truncate(SHORT_DIGEST_HEX_CHARS);
    encoded
}
