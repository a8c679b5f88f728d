use sha2::{Digest, Sha256};

/// The content hash used across dcache: SHA-256 of the raw bytes, base58 encoded.
///
/// It keys the signature index (a signature is made over the content hash of a
/// wire message) and it is the integrity check of a reassembled payload.
pub fn content_hash(bytes: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(bytes.as_ref());
    bs58::encode(digest).into_string()
}
