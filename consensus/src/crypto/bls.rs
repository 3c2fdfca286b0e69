/// BLS signatures over BLS12-381 (blst, min_pk)
///
/// Public keys live in G1 (48 bytes compressed), signatures in G2 (96 bytes).
/// Partial certificates are plain signatures over the vote digest; a quorum
/// certificate carries one aggregate signature plus the signer set, so its
/// size is independent of the committee size.

use blst::min_pk::{
    AggregatePublicKey, AggregateSignature, PublicKey as BlstPublicKey,
    SecretKey as BlstSecretKey, Signature as BlstSignature,
};
use thiserror::Error;

use crate::chained::types::{Block, PartialCert, QuorumCert, ReplicaId, View};
use crate::crypto::hash::{Hash, HASH_SIZE};
use crate::crypto::{Signer, Verifier};

pub const BLS_SIGNATURE_SIZE: usize = 96;
pub const BLS_PUBLIC_KEY_SIZE: usize = 48;
pub const BLS_SECRET_KEY_SIZE: usize = 32;

/// Ciphersuite tag for hash-to-curve.
const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid key material")]
    InvalidKey,
    #[error("invalid signature encoding")]
    InvalidSignature,
    #[error("cannot aggregate an empty set of partial certificates")]
    EmptyAggregate,
    #[error("partial certificate does not match the block being certified")]
    CertMismatch,
    #[error("signature aggregation failed")]
    AggregationFailed,
}

/// BLS secret key wrapper
#[derive(Clone)]
pub struct BlsSecretKey {
    inner: BlstSecretKey,
}

impl BlsSecretKey {
    /// Generate a new random secret key.
    pub fn generate() -> Self {
        let mut ikm = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut ikm);

        Self {
            inner: BlstSecretKey::key_gen(&ikm, &[]).unwrap(),
        }
    }

    /// Derive a key deterministically from 32 bytes of seed material.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            inner: BlstSecretKey::key_gen(seed, &[]).unwrap(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let inner = BlstSecretKey::from_bytes(bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { inner })
    }

    pub fn public_key(&self) -> BlsPublicKey {
        BlsPublicKey {
            inner: self.inner.sk_to_pk(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> BlsSignature {
        BlsSignature {
            inner: self.inner.sign(message, DST, &[]),
        }
    }
}

/// BLS public key wrapper
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlsPublicKey {
    inner: BlstPublicKey,
}

impl BlsPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let inner = BlstPublicKey::from_bytes(bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { inner })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.inner.to_bytes().to_vec()
    }
}

/// BLS signature wrapper (96 bytes compressed)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlsSignature {
    inner: BlstSignature,
}

impl BlsSignature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let inner = BlstSignature::from_bytes(bytes).map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Self { inner })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.inner.to_bytes().to_vec()
    }
}

/// The byte string a replica signs when voting: block hash followed by the
/// little-endian view.
pub fn vote_digest(block_hash: &Hash, view: View) -> Vec<u8> {
    let mut data = Vec::with_capacity(HASH_SIZE + 8);
    data.extend_from_slice(block_hash.as_bytes());
    data.extend_from_slice(&view.to_le_bytes());
    data
}

/// Verify a single signature against one public key.
pub fn verify_single(message: &[u8], signature: &BlsSignature, public_key: &BlsPublicKey) -> bool {
    let err = signature
        .inner
        .verify(true, message, DST, &[], &public_key.inner, true);
    err == blst::BLST_ERROR::BLST_SUCCESS
}

/// Combine signatures over the same message into one aggregate.
pub fn aggregate(signatures: &[&BlsSignature]) -> Result<BlsSignature, CryptoError> {
    if signatures.is_empty() {
        return Err(CryptoError::EmptyAggregate);
    }

    let sigs: Vec<&BlstSignature> = signatures.iter().map(|sig| &sig.inner).collect();
    let combined = AggregateSignature::aggregate(&sigs, false)
        .map_err(|_| CryptoError::AggregationFailed)?
        .to_signature();

    Ok(BlsSignature { inner: combined })
}

/// Verify an aggregate signature over one message against the signers' keys.
pub fn verify_aggregate(
    message: &[u8],
    signature: &BlsSignature,
    public_keys: &[&BlsPublicKey],
) -> bool {
    if public_keys.is_empty() {
        return false;
    }

    let pks: Vec<&BlstPublicKey> = public_keys.iter().map(|pk| &pk.inner).collect();
    let aggregated = match AggregatePublicKey::aggregate(&pks, false) {
        Ok(agg) => agg.to_public_key(),
        Err(_) => return false,
    };

    let err = signature
        .inner
        .verify(true, message, DST, &[], &aggregated, true);
    err == blst::BLST_ERROR::BLST_SUCCESS
}

/// Committee-indexed signer/verifier. Replica `i`'s public key sits at index
/// `i` of the committee vector.
pub struct BlsCrypto {
    id: ReplicaId,
    secret: BlsSecretKey,
    committee: Vec<BlsPublicKey>,
    quorum_size: usize,
    genesis_hash: Hash,
}

impl BlsCrypto {
    pub fn new(
        id: ReplicaId,
        secret: BlsSecretKey,
        committee: Vec<BlsPublicKey>,
        quorum_size: usize,
    ) -> Self {
        Self {
            id,
            secret,
            committee,
            quorum_size,
            genesis_hash: Block::genesis().hash(),
        }
    }

    pub fn id(&self) -> ReplicaId {
        self.id
    }

    fn key_of(&self, id: ReplicaId) -> Option<&BlsPublicKey> {
        self.committee.get(id as usize)
    }
}

impl Signer for BlsCrypto {
    fn create_partial_cert(&self, block: &Block) -> Result<PartialCert, CryptoError> {
        let hash = block.hash();
        let signature = self.secret.sign(&vote_digest(&hash, block.view()));
        Ok(PartialCert::new(self.id, hash, block.view(), signature))
    }

    fn create_quorum_cert(
        &self,
        block: &Block,
        partials: &[PartialCert],
    ) -> Result<QuorumCert, CryptoError> {
        let hash = block.hash();
        if partials.is_empty() {
            // The certificate synthesized for the genesis block at startup.
            // It carries no signature material and is recognised by hash.
            return Ok(QuorumCert::synthesized(hash, block.view()));
        }

        let mut signers = Vec::with_capacity(partials.len());
        let mut signatures = Vec::with_capacity(partials.len());
        for cert in partials {
            if cert.block_hash() != &hash || cert.view() != block.view() {
                return Err(CryptoError::CertMismatch);
            }
            if signers.contains(&cert.signer()) {
                continue;
            }
            signers.push(cert.signer());
            signatures.push(cert.signature());
        }

        let signature = aggregate(&signatures)?;
        Ok(QuorumCert::new(hash, block.view(), signers, signature))
    }
}

impl Verifier for BlsCrypto {
    fn verify_partial_cert(&self, cert: &PartialCert) -> bool {
        let Some(key) = self.key_of(cert.signer()) else {
            return false;
        };
        verify_single(&vote_digest(cert.block_hash(), cert.view()), cert.signature(), key)
    }

    fn verify_quorum_cert(&self, qc: &QuorumCert) -> bool {
        // The synthesized genesis certificate is valid by fiat.
        if qc.block_hash() == &self.genesis_hash {
            return true;
        }
        let Some(signature) = qc.signature() else {
            return false;
        };

        let signers = qc.signers();
        if signers.len() < self.quorum_size {
            return false;
        }
        let mut keys = Vec::with_capacity(signers.len());
        for (i, id) in signers.iter().enumerate() {
            if signers[..i].contains(id) {
                return false;
            }
            match self.key_of(*id) {
                Some(key) => keys.push(key),
                None => return false,
            }
        }

        verify_aggregate(&vote_digest(qc.block_hash(), qc.view()), signature, &keys)
    }
}


// Serialization support for BlsSignature: compressed bytes on the wire.
impl serde::Serialize for BlsSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> serde::Deserialize<'de> for BlsSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};
        use std::fmt;

        struct BlsSignatureVisitor;

        impl<'de> Visitor<'de> for BlsSignatureVisitor {
            type Value = BlsSignature;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte array")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                BlsSignature::from_bytes(v).map_err(de::Error::custom)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut bytes = Vec::new();
                while let Some(byte) = seq.next_element()? {
                    bytes.push(byte);
                }
                BlsSignature::from_bytes(&bytes).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_bytes(BlsSignatureVisitor)
    }
}
