/// Cryptography for the consensus core
///
/// BLS aggregate signatures back the partial and quorum certificates; BLAKE3
/// (or SHA-256) provides block identity. The state machine reaches crypto
/// only through the `Signer` and `Verifier` capabilities below.

pub mod bls;
pub mod hash;

use crate::chained::types::{Block, PartialCert, QuorumCert};

pub use bls::{
    aggregate, vote_digest, verify_aggregate, verify_single, BlsCrypto, BlsPublicKey,
    BlsSecretKey, BlsSignature, CryptoError,
};
pub use hash::{hash_bytes, hash_bytes_with, hash_data, Hash, HashFunction, HASH_SIZE};

/// Produces this replica's signature material.
pub trait Signer: Send + Sync {
    fn create_partial_cert(&self, block: &Block) -> Result<PartialCert, CryptoError>;

    /// Aggregates partial certificates into a quorum certificate. With no
    /// partials this yields the synthesized genesis certificate; quorum
    /// enforcement belongs to the vote pool and the verifier.
    fn create_quorum_cert(
        &self,
        block: &Block,
        partials: &[PartialCert],
    ) -> Result<QuorumCert, CryptoError>;
}

/// Checks signature material received from peers.
pub trait Verifier: Send + Sync {
    fn verify_partial_cert(&self, cert: &PartialCert) -> bool;
    fn verify_quorum_cert(&self, qc: &QuorumCert) -> bool;
}
