//! Offset-anchored bitsets.
//!
//! A value bucket in a map chunk usually covers a run of positions that starts
//! somewhere inside the chunk. [`OffsetBitset`] stores bits only from its anchor
//! onwards, so a bucket first seen near the end of a chunk does not pay for the
//! positions before it.

use bitvec::vec::BitVec;

/// Membership of linear chunk positions, stored relative to an offset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OffsetBitset {
    /// Linear position of bit 0.
    offset: usize,
    bits: BitVec,
}

impl OffsetBitset {
    /// Create an empty bitset anchored at `offset`.
    pub fn new(offset: usize) -> Self {
        Self {
            offset,
            bits: BitVec::new(),
        }
    }

    /// Linear position that bit 0 refers to.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Mark `pos` as a member.
    ///
    /// Positions before the current offset re-anchor the bitset at `pos`.
    /// Returns `true` if the position was not already a member.
    pub fn insert(&mut self, pos: usize) -> bool {
        if pos < self.offset {
            self.rebase(pos);
        }
        let idx = pos - self.offset;
        if idx >= self.bits.len() {
            self.bits.resize(idx + 1, false);
        }
        let was_set = self.bits[idx];
        self.bits.set(idx, true);
        !was_set
    }

    /// Remove `pos` from the set.
    ///
    /// Returns `true` if the position was a member. Trailing unset bits are
    /// released.
    pub fn remove(&mut self, pos: usize) -> bool {
        if !self.contains(pos) {
            return false;
        }
        self.bits.set(pos - self.offset, false);
        let keep = self.bits.last_one().map_or(0, |last| last + 1);
        self.bits.truncate(keep);
        true
    }

    /// Check whether `pos` is a member.
    pub fn contains(&self, pos: usize) -> bool {
        pos >= self.offset
            && self
                .bits
                .get(pos - self.offset)
                .map_or(false, |bit| *bit)
    }

    /// Number of member positions.
    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    /// Member positions in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        let offset = self.offset;
        self.bits.iter_ones().map(move |idx| idx + offset)
    }

    /// Approximate heap bytes held by the bit storage.
    pub fn heap_size(&self) -> usize {
        self.bits.capacity() / 8
    }

    fn rebase(&mut self, new_offset: usize) {
        let shift = self.offset - new_offset;
        let mut bits = BitVec::repeat(false, shift);
        bits.extend_from_bitslice(&self.bits);
        self.bits = bits;
        self.offset = new_offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_relative_to_offset() {
        let mut set = OffsetBitset::new(100);
        assert!(set.is_empty());
        assert!(set.insert(100));
        assert!(set.insert(103));
        assert!(!set.insert(103));

        assert_eq!(set.offset(), 100);
        assert_eq!(set.count(), 2);
        assert!(set.contains(100));
        assert!(!set.contains(101));
        assert!(set.contains(103));
        assert!(!set.contains(5));
        assert!(!set.contains(1000));
    }

    #[test]
    fn test_storage_starts_at_offset() {
        let mut set = OffsetBitset::new(4000);
        set.insert(4000);
        set.insert(4010);
        // Eleven bits worth of storage, not four thousand.
        assert!(set.heap_size() < 64);
    }

    #[test]
    fn test_insert_before_offset_rebases() {
        let mut set = OffsetBitset::new(10);
        set.insert(10);
        set.insert(12);
        set.insert(7);

        assert_eq!(set.offset(), 7);
        assert_eq!(set.iter_ones().collect::<Vec<_>>(), vec![7, 10, 12]);
    }

    #[test]
    fn test_remove() {
        let mut set = OffsetBitset::new(3);
        set.insert(3);
        set.insert(9);

        assert!(set.remove(9));
        assert!(!set.remove(9));
        assert!(!set.remove(1));
        assert_eq!(set.count(), 1);
        assert!(!set.is_empty());

        assert!(set.remove(3));
        assert!(set.is_empty());
        assert_eq!(set.iter_ones().count(), 0);
    }
}
