//! Weighted shard permutation

use super::ShardPermuter;

/// Shard selector yielding, for every hash, a permutation of
/// `[0, weights.len())` in which index `i` occurs `weights[i]` times.
/// Backends with different capacity or throughput receive a
/// proportional share of the traffic.
///
/// The weights are laid out as a perfectly balanced binary search
/// tree over cumulative weights, embedded in an array the way a
/// binary heap is. Selection is a logarithmic descent; rejecting a
/// proposal decrements one unit of weight along the root path and
/// re-derives the next slot without rehashing the key.
pub struct WeightedShardPermuter {
    original_indices: Vec<usize>,
    cumulative_weights: Vec<u64>,
}

/// Recursively place `weights` into the tree node at `tree_index`.
/// `list_index` is the offset of this slice within the original list,
/// so stored indices stay absolute in deep subtrees.
fn convert_list_to_tree(
    weights: &[u32],
    original_indices: &mut [usize],
    cumulative_weights: &mut [u64],
    list_index: usize,
    tree_index: usize,
) {
    if weights.is_empty() {
        return;
    }

    // Determine which element of the list becomes the subtree root:
    // the pivot that keeps both halves perfectly balanced.
    let mut complete_tree_size_plus_one = 2;
    while complete_tree_size_plus_one < weights.len() + 1 {
        complete_tree_size_plus_one *= 2;
    }
    let pivot = if weights.len() >= 3 * complete_tree_size_plus_one / 4 {
        complete_tree_size_plus_one / 2 - 1
    } else {
        weights.len() - complete_tree_size_plus_one / 4
    };

    let left_index = tree_index * 2 + 1;
    convert_list_to_tree(
        &weights[..pivot],
        original_indices,
        cumulative_weights,
        list_index,
        left_index,
    );
    let right_index = left_index + 1;
    convert_list_to_tree(
        &weights[pivot + 1..],
        original_indices,
        cumulative_weights,
        list_index + pivot + 1,
        right_index,
    );

    original_indices[tree_index] = list_index + pivot;
    cumulative_weights[tree_index] = u64::from(weights[pivot]);
    if left_index < cumulative_weights.len() {
        cumulative_weights[tree_index] += cumulative_weights[left_index];
    }
    if right_index < cumulative_weights.len() {
        cumulative_weights[tree_index] += cumulative_weights[right_index];
    }
}

impl WeightedShardPermuter {
    pub fn new(weights: &[u32]) -> Self {
        let mut permuter = Self {
            original_indices: vec![0; weights.len()],
            cumulative_weights: vec![0; weights.len()],
        };
        convert_list_to_tree(
            weights,
            &mut permuter.original_indices,
            &mut permuter.cumulative_weights,
            0,
            0,
        );
        permuter
    }
}

impl ShardPermuter for WeightedShardPermuter {
    fn get_shard(&self, hash: u64, propose: &mut dyn FnMut(usize) -> bool) {
        let mut cumulative_weights = self.cumulative_weights.clone();
        while !cumulative_weights.is_empty() && cumulative_weights[0] > 0 {
            // Binary search for the backend owning this slot.
            let mut slot = hash % cumulative_weights[0];
            let mut index = 0;
            loop {
                let index_left = index * 2 + 1;
                if index_left >= cumulative_weights.len() {
                    break;
                }
                let weight_left = cumulative_weights[index_left];
                if slot < weight_left {
                    index = index_left;
                    continue;
                }
                let index_right = index_left + 1;
                if index_right >= cumulative_weights.len() {
                    break;
                }
                let weight_left_middle = cumulative_weights[index] - cumulative_weights[index_right];
                if slot < weight_left_middle {
                    break;
                }
                index = index_right;
                slot -= weight_left_middle;
            }

            if !propose(self.original_indices[index]) {
                return;
            }

            // The proposal was rejected (e.g. a drained backend).
            // Remove this slot from the tree along the root path and
            // retry; the next iteration derives another slot without
            // rehashing the key.
            loop {
                cumulative_weights[index] -= 1;
                if index == 0 {
                    break;
                }
                index = (index - 1) / 2;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(permuter: &WeightedShardPermuter, hash: u64, limit: usize) -> Vec<usize> {
        let mut proposals = Vec::new();
        permuter.get_shard(hash, &mut |index| {
            proposals.push(index);
            proposals.len() < limit
        });
        proposals
    }

    #[test]
    fn test_known_permutation() {
        // Every index occurs with the weight provided upon creation,
        // in a fixed order for a fixed hash.
        let permuter = WeightedShardPermuter::new(&[1, 4, 2, 5, 3]);
        assert_eq!(
            collect(&permuter, 9127725482751685232, 15),
            [1, 3, 3, 3, 2, 1, 3, 0, 3, 2, 4, 1, 4, 1, 4]
        );
    }

    #[test]
    fn test_exhaustive_rejection_is_a_permutation() {
        let weights = [1u32, 4, 2, 5, 3];
        let permuter = WeightedShardPermuter::new(&weights);
        for hash in [0u64, 1, 42, 9127725482751685232, u64::MAX] {
            let proposals = collect(&permuter, hash, usize::MAX);
            assert_eq!(proposals.len(), 15);
            for (i, &weight) in weights.iter().enumerate() {
                let occurrences = proposals.iter().filter(|&&p| p == i).count();
                assert_eq!(occurrences as u32, weight, "index {i} for hash {hash}");
            }
        }
    }

    #[test]
    fn test_single_backend() {
        let permuter = WeightedShardPermuter::new(&[3]);
        assert_eq!(collect(&permuter, 7, usize::MAX), [0, 0, 0]);
    }

    #[test]
    fn test_accepting_first_proposal_stops() {
        let permuter = WeightedShardPermuter::new(&[2, 2]);
        let proposals = collect(&permuter, 123, 1);
        assert_eq!(proposals.len(), 1);
    }

    #[test]
    fn test_deterministic_per_hash() {
        let permuter = WeightedShardPermuter::new(&[7, 1, 9]);
        for hash in [3u64, 1 << 33, u64::MAX - 5] {
            assert_eq!(
                collect(&permuter, hash, usize::MAX),
                collect(&permuter, hash, usize::MAX)
            );
        }
    }
}
