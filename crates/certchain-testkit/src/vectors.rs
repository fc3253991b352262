//! Merkle test vectors.
//!
//! Each vector is a fixed leaf set. The production tree must agree with a
//! straightforward recursive construction: pair adjacent nodes, duplicate
//! the last node of an odd level, hash `left || right` with BLAKE3.

use certchain_core::{expected_depth, verify_proof, Digest, MerkleTree};

/// A Merkle test vector.
#[derive(Debug, Clone)]
pub struct MerkleVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Leaf preimages; leaves are their BLAKE3 hashes, in this order.
    pub leaves: &'static [&'static str],
}

impl MerkleVector {
    pub fn leaf_hashes(&self) -> Vec<Digest> {
        self.leaves
            .iter()
            .map(|l| Digest::hash(l.as_bytes()))
            .collect()
    }
}

/// Get all Merkle vectors.
pub fn all_vectors() -> Vec<MerkleVector> {
    vec![
        MerkleVector {
            name: "single leaf",
            leaves: &["only"],
        },
        MerkleVector {
            name: "two leaves",
            leaves: &["left", "right"],
        },
        MerkleVector {
            name: "three leaves, odd tail duplicated",
            leaves: &["h1", "h2", "h3"],
        },
        MerkleVector {
            name: "four leaves, balanced",
            leaves: &["a", "b", "c", "d"],
        },
        MerkleVector {
            name: "five leaves, duplication on two levels",
            leaves: &["1", "2", "3", "4", "5"],
        },
        MerkleVector {
            name: "repeated leaf",
            leaves: &["same", "same", "same"],
        },
        MerkleVector {
            name: "empty preimage",
            leaves: &["", "x"],
        },
        MerkleVector {
            name: "nine leaves",
            leaves: &["a", "b", "c", "d", "e", "f", "g", "h", "i"],
        },
    ]
}

fn pair(left: &Digest, right: &Digest) -> Digest {
    let mut bytes = Vec::with_capacity(64);
    bytes.extend_from_slice(left.as_bytes());
    bytes.extend_from_slice(right.as_bytes());
    Digest::hash(&bytes)
}

/// Root by direct recursion over levels.
///
/// # Panics
/// On an empty leaf set.
pub fn reference_root(level: &[Digest]) -> Digest {
    match level {
        [] => panic!("no leaves"),
        [root] => *root,
        _ => {
            let next: Vec<Digest> = level
                .chunks(2)
                .map(|c| pair(&c[0], c.get(1).unwrap_or(&c[0])))
                .collect();
            reference_root(&next)
        }
    }
}

/// Check every vector: root agreement, proof length, proof validity.
pub fn verify_all_vectors() -> Result<(), String> {
    for vector in all_vectors() {
        let leaves = vector.leaf_hashes();
        let tree = MerkleTree::from_leaves(leaves.clone()).map_err(|e| e.to_string())?;

        let expected = reference_root(&leaves);
        if tree.root() != expected {
            return Err(format!(
                "{}: root {} != reference {}",
                vector.name,
                tree.root(),
                expected
            ));
        }

        for (index, leaf) in leaves.iter().enumerate() {
            let path = tree
                .proof(index)
                .ok_or_else(|| format!("{}: no proof for leaf {index}", vector.name))?;
            if path.len() != expected_depth(leaves.len()) {
                return Err(format!(
                    "{}: leaf {index} proof has {} steps, expected {}",
                    vector.name,
                    path.len(),
                    expected_depth(leaves.len())
                ));
            }
            if !verify_proof(leaf, &path, &expected) {
                return Err(format!("{}: proof for leaf {index} fails", vector.name));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors() {
        verify_all_vectors().unwrap();
    }

    #[test]
    fn test_reference_matches_hand_computation() {
        let l: Vec<Digest> = [b"h1", b"h2", b"h3"].iter().map(|b| Digest::hash(*b)).collect();
        let expected = pair(&pair(&l[0], &l[1]), &pair(&l[2], &l[2]));
        assert_eq!(reference_root(&l), expected);
    }

    #[test]
    fn test_leaf_order_matters() {
        let forward = vec![Digest::hash(b"a"), Digest::hash(b"b")];
        let reversed: Vec<Digest> = forward.iter().rev().copied().collect();
        assert_ne!(reference_root(&forward), reference_root(&reversed));
    }
}
