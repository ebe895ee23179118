//! Deletion planner - compiles a garbage index set into swap/trim writes
//!
//! Hosts only support `swap(i, j)` and `trim(k)` on their sector array, so
//! every garbage sector is first moved into the tail and the tail is then
//! trimmed in one go.
//!
//! Garbage indices are visited in descending order while a cursor walks down
//! from the last position. When the cursor sits on the garbage index itself,
//! that sector is already inside the tail that will be trimmed. Otherwise the
//! sector under the cursor is known to be good (every larger garbage index was
//! handled earlier) and is swapped into the garbage slot. Each good sector
//! moves at most once.

use crate::host::WriteAction;

/// Plan the deletion of the sectors at `garbage` from an array of `len`
/// sectors. Indices must be distinct and below `len`.
///
/// An empty garbage set yields an empty plan; callers should not contact the
/// host at all in that case.
pub fn plan_deletion(garbage: &[u64], len: u64) -> Vec<WriteAction> {
    if garbage.is_empty() {
        return Vec::new();
    }

    let mut bad = garbage.to_vec();
    bad.sort_unstable_by(|a, b| b.cmp(a));
    debug_assert!(bad.windows(2).all(|w| w[0] != w[1]), "duplicate garbage index");
    debug_assert!(bad[0] < len, "garbage index {} out of range {}", bad[0], len);

    let mut actions = Vec::with_capacity(bad.len() + 1);
    let mut cursor = len - 1;
    for &index in &bad {
        if cursor != index {
            actions.push(WriteAction::Swap {
                a: cursor,
                b: index,
            });
        }
        cursor = cursor.wrapping_sub(1);
    }

    actions.push(WriteAction::Trim {
        n: bad.len() as u64,
    });
    actions
}

/// Number of swaps `plan_deletion` emits: garbage already inside the final
/// tail needs none.
pub fn swap_count(garbage: &[u64], len: u64) -> usize {
    let tail_start = len - garbage.len() as u64;
    garbage.iter().filter(|&&i| i < tail_start).count()
}
