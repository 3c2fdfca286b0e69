/// Core chained-HotStuff data structures
///
/// Blocks reference their parent and their justifying block by hash; the
/// block store is the sole owner of block data, so no ownership cycles exist
/// between a block, its certificate, and its parent.

use serde::{Deserialize, Serialize};

use crate::crypto::{hash_data, BlsSignature, Hash};

/// Protocol round number. Genesis is view 0.
pub type View = u64;

/// Stable index naming a replica within the committee.
pub type ReplicaId = u32;

/// Opaque application payload carried by a block.
pub type Command = Vec<u8>;

/// An immutable chain node. Identity is the hash of the header fields; two
/// blocks with the same hash are the same block.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    parent: Hash,
    qc: Option<QuorumCert>,
    view: View,
    proposer: ReplicaId,
    command: Command,
}

impl Block {
    pub fn new(
        parent: Hash,
        qc: QuorumCert,
        view: View,
        proposer: ReplicaId,
        command: Command,
    ) -> Self {
        Self {
            parent,
            qc: Some(qc),
            view,
            proposer,
            command,
        }
    }

    /// The well-known genesis block: view 0, no certificate, empty command.
    pub fn genesis() -> Self {
        Self {
            parent: Hash::zero(),
            qc: None,
            view: 0,
            proposer: 0,
            command: Command::new(),
        }
    }

    /// A placeholder for a skipped view. Dummies carry no certificate and are
    /// never executed; they only keep view numbers continuous.
    pub fn dummy(parent: &Block, proposer: ReplicaId) -> Self {
        Self {
            parent: parent.hash(),
            qc: None,
            view: parent.view + 1,
            proposer,
            command: Command::new(),
        }
    }

    pub fn hash(&self) -> Hash {
        let justify = self
            .qc
            .as_ref()
            .map(|qc| *qc.block_hash())
            .unwrap_or_else(Hash::zero);
        hash_data(&(self.parent, justify, self.view, self.proposer, &self.command))
    }

    pub fn parent(&self) -> &Hash {
        &self.parent
    }

    pub fn qc(&self) -> Option<&QuorumCert> {
        self.qc.as_ref()
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn proposer(&self) -> ReplicaId {
        self.proposer
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Dummies carry no certificate; the genesis block does not count.
    pub fn is_dummy(&self) -> bool {
        self.qc.is_none() && self.view > 0
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Block {}

/// Proof that a quorum of replicas voted for one block at one view. The
/// aggregate signature covers the vote digest; `signature` is `None` only for
/// the certificate synthesized over the genesis block at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumCert {
    block_hash: Hash,
    view: View,
    signers: Vec<ReplicaId>,
    signature: Option<BlsSignature>,
}

impl QuorumCert {
    pub fn new(
        block_hash: Hash,
        view: View,
        signers: Vec<ReplicaId>,
        signature: BlsSignature,
    ) -> Self {
        Self {
            block_hash,
            view,
            signers,
            signature: Some(signature),
        }
    }

    /// The unsigned certificate handed to a fresh replica for genesis.
    pub fn synthesized(block_hash: Hash, view: View) -> Self {
        Self {
            block_hash,
            view,
            signers: Vec::new(),
            signature: None,
        }
    }

    pub fn block_hash(&self) -> &Hash {
        &self.block_hash
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn signers(&self) -> &[ReplicaId] {
        &self.signers
    }

    pub fn signature(&self) -> Option<&BlsSignature> {
        self.signature.as_ref()
    }
}

/// One replica's signed vote for a block at a view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialCert {
    signer: ReplicaId,
    block_hash: Hash,
    view: View,
    signature: BlsSignature,
}

impl PartialCert {
    pub fn new(signer: ReplicaId, block_hash: Hash, view: View, signature: BlsSignature) -> Self {
        Self {
            signer,
            block_hash,
            view,
            signature,
        }
    }

    pub fn signer(&self) -> ReplicaId {
        self.signer
    }

    pub fn block_hash(&self) -> &Hash {
        &self.block_hash
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn signature(&self) -> &BlsSignature {
        &self.signature
    }
}

/// Snapshot handed to the view synchronizer when a fresh QC forms.
#[derive(Clone, Debug)]
pub struct SyncInfo {
    pub qc: QuorumCert,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_shape() {
        let genesis = Block::genesis();

        assert_eq!(genesis.view(), 0);
        assert_eq!(genesis.parent(), &Hash::zero());
        assert!(genesis.qc().is_none());
        assert!(genesis.command().is_empty());
        assert!(!genesis.is_dummy());
    }

    #[test]
    fn test_dummy_shape() {
        let genesis = Block::genesis();
        let dummy = Block::dummy(&genesis, 2);

        assert_eq!(dummy.view(), 1);
        assert_eq!(dummy.parent(), &genesis.hash());
        assert!(dummy.qc().is_none());
        assert!(dummy.is_dummy());
    }

    #[test]
    fn test_hash_is_stable() {
        let genesis = Block::genesis();
        assert_eq!(genesis.hash(), Block::genesis().hash());
    }

    #[test]
    fn test_hash_covers_command() {
        let genesis = Block::genesis();
        let qc = QuorumCert::synthesized(genesis.hash(), 0);

        let a = Block::new(genesis.hash(), qc.clone(), 1, 0, b"a".to_vec());
        let b = Block::new(genesis.hash(), qc, 1, 0, b"b".to_vec());

        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_blocks_equal_by_hash() {
        let genesis = Block::genesis();
        let qc = QuorumCert::synthesized(genesis.hash(), 0);

        let a = Block::new(genesis.hash(), qc.clone(), 1, 0, b"cmd".to_vec());
        let b = Block::new(genesis.hash(), qc.clone(), 1, 0, b"cmd".to_vec());
        let c = Block::new(genesis.hash(), qc, 2, 0, b"cmd".to_vec());

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_synthesized_cert_has_no_signers() {
        let qc = QuorumCert::synthesized(Hash::zero(), 0);

        assert!(qc.signers().is_empty());
        assert!(qc.signature().is_none());
    }
}
