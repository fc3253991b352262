//! Binary Merkle tree over content digests.
//!
//! Leaves are taken in arrival order and never sorted, so the root commits
//! to the order of the batch. Parents are `H(left || right)`. A level with an
//! odd number of nodes pairs its last node with itself, which keeps every
//! level perfectly binary and the combining rule uniform.
//!
//! Inclusion proofs list one sibling per level from leaf to root, each
//! tagged with the side the sibling sits on, so a proof for a tree of `n`
//! leaves always has `ceil(log2(n))` steps.

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::{CoreError, Result};
use crate::hash::ContentHasher;

/// Which side of the running hash a sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Sibling is the left child: parent = H(sibling || current).
    Left,
    /// Sibling is the right child: parent = H(current || sibling).
    Right,
}

/// One step of an inclusion proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProofStep {
    /// The sibling digest at this level.
    pub hash: Digest,
    /// Position of the sibling.
    pub side: Side,
}

impl ProofStep {
    /// Fold this step into the running hash.
    pub fn combine(&self, current: &Digest) -> Digest {
        match self.side {
            Side::Left => ContentHasher::hash_pair(&self.hash, current),
            Side::Right => ContentHasher::hash_pair(current, &self.hash),
        }
    }
}

/// A fully materialized Merkle tree.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Levels bottom-up: `levels[0]` are the leaves, the last level is the root.
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a tree from leaf digests in the given order.
    pub fn from_leaves(leaves: Vec<Digest>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(CoreError::EmptyBatch);
        }
        if leaves.len() > u32::MAX as usize {
            return Err(CoreError::BatchTooLarge(leaves.len()));
        }

        let mut levels = vec![leaves];
        while levels[levels.len() - 1].len() > 1 {
            let current = &levels[levels.len() - 1];
            let next: Vec<Digest> = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => ContentHasher::hash_pair(left, right),
                    [last] => ContentHasher::hash_pair(last, last),
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            levels.push(next);
        }

        let tree = Self { levels };
        assert_eq!(
            tree.depth(),
            expected_depth(tree.leaf_count()),
            "merkle tree depth does not match leaf count"
        );
        Ok(tree)
    }

    /// The root digest.
    pub fn root(&self) -> Digest {
        self.levels[self.levels.len() - 1][0]
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Number of levels above the leaves.
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// The leaf digests in order.
    pub fn leaves(&self) -> &[Digest] {
        &self.levels[0]
    }

    /// Inclusion proof for the leaf at `index`, or `None` if out of range.
    ///
    /// # Panics
    ///
    /// Panics if the produced path length differs from the tree depth.
    pub fn proof(&self, index: usize) -> Option<Vec<ProofStep>> {
        if index >= self.leaf_count() {
            return None;
        }

        let mut path = Vec::with_capacity(self.depth());
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let step = if idx % 2 == 0 {
                // Last node of an odd level is its own sibling.
                let sibling = level.get(idx + 1).copied().unwrap_or(level[idx]);
                ProofStep {
                    hash: sibling,
                    side: Side::Right,
                }
            } else {
                ProofStep {
                    hash: level[idx - 1],
                    side: Side::Left,
                }
            };
            path.push(step);
            idx /= 2;
        }

        assert_eq!(
            path.len(),
            self.depth(),
            "proof length does not match tree depth"
        );
        Some(path)
    }
}

/// Proof length for a tree of `leaf_count` leaves: `ceil(log2(leaf_count))`.
pub fn expected_depth(leaf_count: usize) -> usize {
    if leaf_count <= 1 {
        0
    } else {
        (usize::BITS - (leaf_count - 1).leading_zeros()) as usize
    }
}

/// Recompute the root by walking the sibling path upward from `leaf`.
pub fn compute_root(leaf: &Digest, path: &[ProofStep]) -> Digest {
    path.iter().fold(*leaf, |current, step| step.combine(&current))
}

/// Check that `leaf` is included under `root` via `path`.
pub fn verify_proof(leaf: &Digest, path: &[ProofStep], root: &Digest) -> bool {
    compute_root(leaf, path) == *root
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaves(labels: &[&str]) -> Vec<Digest> {
        labels.iter().map(|l| Digest::hash(l.as_bytes())).collect()
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            MerkleTree::from_leaves(Vec::new()),
            Err(CoreError::EmptyBatch)
        ));
    }

    #[test]
    fn test_single_leaf_root_is_leaf() {
        let l = leaves(&["only"]);
        let tree = MerkleTree::from_leaves(l.clone()).unwrap();
        assert_eq!(tree.root(), l[0]);
        assert_eq!(tree.depth(), 0);
        assert!(tree.proof(0).unwrap().is_empty());
        assert!(verify_proof(&l[0], &[], &tree.root()));
    }

    #[test]
    fn test_two_leaves() {
        let l = leaves(&["a", "b"]);
        let tree = MerkleTree::from_leaves(l.clone()).unwrap();
        assert_eq!(tree.root(), ContentHasher::hash_pair(&l[0], &l[1]));

        let proof = tree.proof(1).unwrap();
        assert_eq!(proof, vec![ProofStep { hash: l[0], side: Side::Left }]);
    }

    #[test]
    fn test_three_leaves_duplicates_last() {
        let l = leaves(&["h1", "h2", "h3"]);
        let tree = MerkleTree::from_leaves(l.clone()).unwrap();

        let left = ContentHasher::hash_pair(&l[0], &l[1]);
        let right = ContentHasher::hash_pair(&l[2], &l[2]);
        assert_eq!(tree.root(), ContentHasher::hash_pair(&left, &right));

        let proof = tree.proof(1).unwrap();
        assert_eq!(proof.len(), 2);
        assert_eq!(compute_root(&l[1], &proof), tree.root());

        let last = tree.proof(2).unwrap();
        assert_eq!(last[0], ProofStep { hash: l[2], side: Side::Right });
        assert_eq!(last[1], ProofStep { hash: left, side: Side::Left });
    }

    #[test]
    fn test_out_of_range_proof() {
        let tree = MerkleTree::from_leaves(leaves(&["a", "b"])).unwrap();
        assert!(tree.proof(2).is_none());
    }

    #[test]
    fn test_expected_depth() {
        assert_eq!(expected_depth(1), 0);
        assert_eq!(expected_depth(2), 1);
        assert_eq!(expected_depth(3), 2);
        assert_eq!(expected_depth(4), 2);
        assert_eq!(expected_depth(5), 3);
        assert_eq!(expected_depth(1024), 10);
        assert_eq!(expected_depth(1025), 11);
    }

    #[test]
    fn test_order_sensitive() {
        let ab = MerkleTree::from_leaves(leaves(&["a", "b"])).unwrap();
        let ba = MerkleTree::from_leaves(leaves(&["b", "a"])).unwrap();
        assert_ne!(ab.root(), ba.root());
    }

    fn distinct_leaves() -> impl Strategy<Value = Vec<Digest>> {
        prop::collection::hash_set(any::<[u8; 32]>(), 1..64)
            .prop_map(|set| set.into_iter().map(Digest::from_bytes).collect())
    }

    proptest! {
        #[test]
        fn every_proof_verifies(leaves in distinct_leaves()) {
            let tree = MerkleTree::from_leaves(leaves.clone()).unwrap();
            for (i, leaf) in leaves.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                prop_assert_eq!(proof.len(), expected_depth(leaves.len()));
                prop_assert!(verify_proof(leaf, &proof, &tree.root()));
            }
        }

        #[test]
        fn flipped_sibling_fails(
            leaves in prop::collection::hash_set(any::<[u8; 32]>(), 2..64),
            pick in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let leaves: Vec<Digest> = leaves.into_iter().map(Digest::from_bytes).collect();
            let tree = MerkleTree::from_leaves(leaves.clone()).unwrap();
            let i = pick.index(leaves.len());
            let mut proof = tree.proof(i).unwrap();
            let step = pick.index(proof.len());
            proof[step].hash.0[0] ^= 1 << bit;
            prop_assert!(!verify_proof(&leaves[i], &proof, &tree.root()));
        }

        #[test]
        fn reordering_changes_root(
            leaves in prop::collection::hash_set(any::<[u8; 32]>(), 2..32),
        ) {
            let leaves: Vec<Digest> = leaves.into_iter().map(Digest::from_bytes).collect();
            let mut reversed = leaves.clone();
            reversed.reverse();
            let a = MerkleTree::from_leaves(leaves).unwrap();
            let b = MerkleTree::from_leaves(reversed).unwrap();
            prop_assert_ne!(a.root(), b.root());
        }
    }
}
