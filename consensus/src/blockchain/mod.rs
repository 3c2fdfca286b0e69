/// Content-addressed block storage
///
/// The store owns every block the replica knows about. Writes are idempotent
/// and blocks are never mutated once stored.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::chained::types::Block;
use crate::crypto::Hash;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("missing block {0}")]
    MissingBlock(Hash),
}

/// Hash-addressed block storage capability.
pub trait BlockChain: Send + Sync {
    fn store(&self, block: Block);
    fn get(&self, hash: &Hash) -> Option<Block>;

    /// Walks the parent chain from `from` towards lower views and reports
    /// whether it passes through `ancestor`. The walk stops at the first
    /// block whose view is not above the ancestor's; a missing intermediate
    /// parent fails the walk.
    fn extends(&self, from: &Block, ancestor: &Block) -> Result<bool, ChainError> {
        let mut current = from.clone();
        loop {
            if current.hash() == ancestor.hash() {
                return Ok(true);
            }
            if current.view() <= ancestor.view() {
                return Ok(false);
            }
            let parent = *current.parent();
            current = self.get(&parent).ok_or(ChainError::MissingBlock(parent))?;
        }
    }
}

/// In-memory store with the genesis block pre-installed.
pub struct InMemoryBlockStore {
    blocks: RwLock<HashMap<Hash, Block>>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        let genesis = Block::genesis();
        let mut blocks = HashMap::new();
        blocks.insert(genesis.hash(), genesis);
        Self {
            blocks: RwLock::new(blocks),
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockChain for InMemoryBlockStore {
    fn store(&self, block: Block) {
        self.blocks
            .write()
            .unwrap()
            .entry(block.hash())
            .or_insert(block);
    }

    fn get(&self, hash: &Hash) -> Option<Block> {
        self.blocks.read().unwrap().get(hash).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chained::types::QuorumCert;

    fn child(parent: &Block, view: u64, command: &[u8]) -> Block {
        let qc = QuorumCert::synthesized(parent.hash(), parent.view());
        Block::new(parent.hash(), qc, view, 0, command.to_vec())
    }

    #[test]
    fn test_genesis_preinstalled() {
        let store = InMemoryBlockStore::new();
        let genesis = Block::genesis();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&genesis.hash()), Some(genesis));
    }

    #[test]
    fn test_store_is_idempotent() {
        let store = InMemoryBlockStore::new();
        let block = child(&Block::genesis(), 1, b"once");

        store.store(block.clone());
        store.store(block.clone());

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&block.hash()), Some(block));
    }

    #[test]
    fn test_extends_direct_chain() {
        let store = InMemoryBlockStore::new();
        let genesis = Block::genesis();
        let b1 = child(&genesis, 1, b"one");
        let b2 = child(&b1, 2, b"two");
        store.store(b1.clone());
        store.store(b2.clone());

        assert!(store.extends(&b2, &genesis).unwrap());
        assert!(store.extends(&b2, &b1).unwrap());
        assert!(store.extends(&b1, &b1).unwrap());
    }

    #[test]
    fn test_extends_rejects_fork() {
        let store = InMemoryBlockStore::new();
        let genesis = Block::genesis();
        let b1 = child(&genesis, 1, b"one");
        let fork = child(&genesis, 1, b"other");
        store.store(b1.clone());
        store.store(fork.clone());

        assert!(!store.extends(&fork, &b1).unwrap());
    }

    #[test]
    fn test_extends_reports_missing_parent() {
        let store = InMemoryBlockStore::new();
        let genesis = Block::genesis();
        let b1 = child(&genesis, 1, b"one");
        let b2 = child(&b1, 2, b"two");
        // b1 is deliberately absent.
        store.store(b2.clone());

        assert!(matches!(
            store.extends(&b2, &genesis),
            Err(ChainError::MissingBlock(hash)) if hash == b1.hash()
        ));
    }
}
