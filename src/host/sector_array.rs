//! Host-side sector array - the contiguous layout swap/trim writes act on

use super::WriteAction;
use crate::crypto::SectorRoot;

use thiserror::Error;

/// A write action that cannot be applied to the current layout
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("action #{position} ({action}) is out of bounds for {len} sectors")]
pub struct ActionError {
    /// Index of the offending action within its batch
    pub position: usize,
    pub action: WriteAction,
    /// Sector count at the time the action was reached
    pub len: u64,
}

/// Ordered sector roots held by a host; valid indices are always `0..len`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectorArray {
    roots: Vec<SectorRoot>,
}

impl SectorArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_roots(roots: Vec<SectorRoot>) -> Self {
        Self { roots }
    }

    pub fn len(&self) -> u64 {
        self.roots.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn roots(&self) -> &[SectorRoot] {
        &self.roots
    }

    /// Roots in `offset..offset + count`, clamped to the array end
    pub fn range(&self, offset: u64, count: u64) -> Option<&[SectorRoot]> {
        let start = usize::try_from(offset).ok()?;
        if start > self.roots.len() {
            return None;
        }
        let end = start.saturating_add(usize::try_from(count).unwrap_or(usize::MAX));
        Some(&self.roots[start..end.min(self.roots.len())])
    }

    /// Append a sector at the end of the array
    pub fn append(&mut self, root: SectorRoot) -> u64 {
        self.roots.push(root);
        self.len() - 1
    }

    /// Apply a batch of actions; either every action applies or none does
    pub fn apply(&mut self, actions: &[WriteAction]) -> Result<(), ActionError> {
        let mut staged = self.roots.clone();

        for (position, &action) in actions.iter().enumerate() {
            let len = staged.len() as u64;
            let out_of_bounds = ActionError {
                position,
                action,
                len,
            };
            match action {
                WriteAction::Swap { a, b } => {
                    if a >= len || b >= len {
                        return Err(out_of_bounds);
                    }
                    staged.swap(a as usize, b as usize);
                }
                WriteAction::Trim { n } => {
                    if n > len {
                        return Err(out_of_bounds);
                    }
                    staged.truncate((len - n) as usize);
                }
            }
        }

        self.roots = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled(n: u8) -> Vec<SectorRoot> {
        (0..n).map(|i| SectorRoot::from_bytes([i; 32])).collect()
    }

    #[test]
    fn test_swap_and_trim() {
        let roots = labeled(4);
        let mut array = SectorArray::from_roots(roots.clone());

        array
            .apply(&[WriteAction::Swap { a: 3, b: 0 }, WriteAction::Trim { n: 1 }])
            .unwrap();

        assert_eq!(array.roots(), &[roots[3], roots[1], roots[2]]);
    }

    #[test]
    fn test_invalid_batch_leaves_array_untouched() {
        let roots = labeled(3);
        let mut array = SectorArray::from_roots(roots.clone());

        let err = array
            .apply(&[
                WriteAction::Swap { a: 2, b: 0 },
                WriteAction::Trim { n: 1 },
                WriteAction::Swap { a: 2, b: 0 },
            ])
            .unwrap_err();

        assert_eq!(err.position, 2);
        assert_eq!(err.len, 2);
        assert_eq!(array.roots(), roots.as_slice());
    }

    #[test]
    fn test_trim_more_than_len_fails() {
        let mut array = SectorArray::from_roots(labeled(2));
        assert!(array.apply(&[WriteAction::Trim { n: 3 }]).is_err());
        assert!(array.apply(&[WriteAction::Trim { n: 2 }]).is_ok());
        assert!(array.is_empty());
    }

    #[test]
    fn test_range() {
        let roots = labeled(5);
        let array = SectorArray::from_roots(roots.clone());

        assert_eq!(array.range(1, 2).unwrap(), &roots[1..3]);
        assert_eq!(array.range(4, 10).unwrap(), &roots[4..]);
        assert_eq!(array.range(5, 1).unwrap().len(), 0);
        assert!(array.range(6, 1).is_none());
    }
}
