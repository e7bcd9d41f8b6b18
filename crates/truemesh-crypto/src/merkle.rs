//! Merkle trees over 32-byte leaves
//!
//! Internal nodes are `SHA256(left ‖ right)` over the raw digests. When a
//! level has an odd number of nodes the last one is paired with itself.

use serde::{Deserialize, Serialize};

use crate::{hash_all, sha256, Hash256};

/// Side on which a sibling sits relative to the running hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiblingPosition {
    Left,
    Right,
}

/// One step of a Merkle inclusion proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub position: SiblingPosition,
    pub hash: Hash256,
}

/// Sibling path from a leaf up to the root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: usize,
    pub steps: Vec<ProofStep>,
}

/// A fully materialized Merkle tree. `levels[0]` holds the leaves and the
/// last level holds the single root.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash256>>,
}

impl MerkleTree {
    /// Build a tree from ordered leaf hashes
    pub fn build(leaves: &[Hash256]) -> Self {
        if leaves.is_empty() {
            return Self {
                levels: vec![vec![empty_root()]],
            };
        }

        let mut levels = vec![leaves.to_vec()];
        while levels.last().map(|l| l.len()).unwrap_or(0) > 1 {
            let current = &levels[levels.len() - 1];
            let next: Vec<Hash256> = current
                .chunks(2)
                .map(|pair| {
                    let left = pair[0];
                    let right = pair.get(1).copied().unwrap_or(left);
                    hash_all(&[left.as_bytes(), right.as_bytes()])
                })
                .collect();
            levels.push(next);
        }

        Self { levels }
    }

    pub fn root(&self) -> Hash256 {
        self.levels
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or_else(empty_root)
    }

    pub fn leaf_count(&self) -> usize {
        if self.levels.len() == 1 && self.levels[0] == [empty_root()] {
            // a tree built from no leaves still stores the empty root
            return 0;
        }
        self.levels[0].len()
    }

    /// Generate the inclusion proof for the leaf at `index`
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut steps = Vec::with_capacity(self.levels.len());
        let mut current = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let (position, sibling) = if current % 2 == 0 {
                let sibling = level.get(current + 1).copied().unwrap_or(level[current]);
                (SiblingPosition::Right, sibling)
            } else {
                (SiblingPosition::Left, level[current - 1])
            };
            steps.push(ProofStep {
                position,
                hash: sibling,
            });
            current /= 2;
        }

        Some(MerkleProof {
            leaf_index: index,
            steps,
        })
    }

    /// Index of the first leaf equal to `leaf`
    pub fn position(&self, leaf: &Hash256) -> Option<usize> {
        if self.leaf_count() == 0 {
            return None;
        }
        self.levels[0].iter().position(|h| h == leaf)
    }
}

/// Root of a tree with no leaves
pub fn empty_root() -> Hash256 {
    sha256(b"")
}

/// Get the Merkle root from leaves
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    MerkleTree::build(leaves).root()
}

/// Recompute the path from `leaf` and compare with `root`
pub fn verify_merkle_proof(leaf: Hash256, proof: &MerkleProof, root: Hash256) -> bool {
    let mut current = leaf;

    for step in &proof.steps {
        current = match step.position {
            SiblingPosition::Left => hash_all(&[step.hash.as_bytes(), current.as_bytes()]),
            SiblingPosition::Right => hash_all(&[current.as_bytes(), step.hash.as_bytes()]),
        };
    }

    current == root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: u8) -> Vec<Hash256> {
        (0..n).map(|i| sha256(&[i])).collect()
    }

    #[test]
    fn test_single_leaf_root_is_leaf() {
        let l = leaves(1);
        assert_eq!(merkle_root(&l), l[0]);
        let tree = MerkleTree::build(&l);
        let proof = tree.proof(0).unwrap();
        assert!(proof.steps.is_empty());
        assert!(verify_merkle_proof(l[0], &proof, tree.root()));
    }

    #[test]
    fn test_odd_leaf_is_duplicated() {
        let l = leaves(3);
        let left = hash_all(&[l[0].as_bytes(), l[1].as_bytes()]);
        let right = hash_all(&[l[2].as_bytes(), l[2].as_bytes()]);
        let expected = hash_all(&[left.as_bytes(), right.as_bytes()]);
        assert_eq!(merkle_root(&l), expected);
    }

    #[test]
    fn test_every_leaf_proves_inclusion() {
        for n in 1..=9u8 {
            let l = leaves(n);
            let tree = MerkleTree::build(&l);
            for (i, leaf) in l.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert!(verify_merkle_proof(*leaf, &proof, tree.root()), "n={n} i={i}");
            }
        }
    }

    #[test]
    fn test_wrong_leaf_fails() {
        let l = leaves(4);
        let tree = MerkleTree::build(&l);
        let proof = tree.proof(0).unwrap();
        assert!(!verify_merkle_proof(sha256(b"wrong"), &proof, tree.root()));
    }

    #[test]
    fn test_empty_tree() {
        let tree = MerkleTree::build(&[]);
        assert_eq!(tree.root(), empty_root());
        assert_eq!(tree.leaf_count(), 0);
        assert!(tree.proof(0).is_none());
    }
}
