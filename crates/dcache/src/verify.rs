use std::sync::Arc;

/// Decides whether a signature message is trusted.
///
/// The cache itself treats signatures as opaque strings; real cryptographic
/// checking is plugged in here by the embedding application.
pub trait SignatureVerifier: 'static + Send + Sync + std::fmt::Debug {
    /// Is `signature` a valid signature by `signer` over the content hash `data_hash`?
    fn verify(&self, signer: &str, data_hash: &str, signature: &str) -> bool;
}

/// Shared verifier handle
pub type Verifier = Arc<dyn SignatureVerifier>;

/// Accepts every signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustAll;

impl SignatureVerifier for TrustAll {
    fn verify(&self, _signer: &str, _data_hash: &str, _signature: &str) -> bool {
        true
    }
}
