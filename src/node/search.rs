/// Return the index of the rightmost key `<= target`.
///
/// `keys` must be strictly increasing. `None` means that the node has no candidate at all
/// (empty node or `keys[0] > target`), which in a well-formed tree can't happen because the
/// sentinel minimum key bounds every lookup key from below.
#[inline]
pub fn predecessor<K: Ord>(keys: &[K], target: &K) -> Option<usize> {
    match keys.first() {
        Some(first) if first <= target => {}
        _ => return None,
    }

    // keys[low] <= target, answer lies in [low, high)
    let mut low = 0;
    let mut high = keys.len();
    while high - low > 1 {
        // upper middle of candidates, ties move toward larger index
        let mid = low + (high - low) / 2;
        if *target < keys[mid] {
            high = mid;
        } else {
            low = mid;
        }
    }
    Some(low)
}

/// Check that `keys[index]` is a valid predecessor of `target`:
/// `keys[index] <= target < keys[index + 1]`.
#[inline]
pub fn brackets<K: Ord>(keys: &[K], index: usize, target: &K) -> bool {
    match keys.get(index) {
        Some(key) if key <= target => keys.get(index + 1).map_or(true, |next| target < next),
        _ => false,
    }
}
