use crate::*;
use async_trait::async_trait;
use num_bigint::BigUint;

/// The service that owns each election's private key.
///
/// The aggregator only ever asks it for public keys and for the decryption of
/// an already-summed ciphertext. It never sees a private key.
#[async_trait]
pub trait Authority: Send + Sync {
    /// Fetch the election's public key.
    ///
    /// Fails with `ElectionNotFound` if the election's key material was never initialized.
    async fn public_key(&self, election: &ElectionId) -> Result<PublicKey, Error>;

    /// Decrypt the homomorphic sum of an election's ballots
    async fn decrypt(&self, election: &ElectionId, ciphertext_sum: &BigUint) -> Result<u64, Error>;
}
