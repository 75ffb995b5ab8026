//! Longest increasing subsequence.

/// Positions of a longest strictly increasing subsequence of `seq`.
///
/// Zero entries mean "no old counterpart" and are skipped. Runs in
/// O(n log n): `tails[k]` holds the position of the smallest tail of any
/// increasing run of length `k + 1`, and `predecessors` links each position
/// to the previous element of its run.
pub fn longest_increasing_subsequence(seq: &[usize]) -> Vec<usize> {
    let mut predecessors: Vec<Option<usize>> = vec![None; seq.len()];
    let mut tails: Vec<usize> = Vec::new();

    for (i, &value) in seq.iter().enumerate() {
        if value == 0 {
            continue;
        }
        let len = tails.partition_point(|&t| seq[t] < value);
        if len > 0 {
            predecessors[i] = Some(tails[len - 1]);
        }
        if len == tails.len() {
            tails.push(i);
        } else {
            tails[len] = i;
        }
    }

    let mut result = vec![0; tails.len()];
    let mut cursor = tails.last().copied();
    for slot in result.iter_mut().rev() {
        let Some(i) = cursor else { break };
        *slot = i;
        cursor = predecessors[i];
    }
    result
}
