//! Printable character counting.
//!
//! A byte is printable when it lies in `32..=126` (space through `~`).
//! Everything else, including DEL and all bytes >= 128, is ignored.

use std::ops::RangeInclusive;

/// The printable byte range.
pub const PRINTABLE: RangeInclusive<u8> = 32..=126;

/// Number of distinct printable characters.
pub const PRINTABLE_COUNT: usize = 95;

const FIRST_PRINTABLE: u8 = 32;

/// Whether `byte` is a printable ASCII character.
#[inline]
pub fn is_printable(byte: u8) -> bool {
    PRINTABLE.contains(&byte)
}

/// Per-character occurrence counts, one slot per printable character
/// (slot = code - 32).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Histogram {
    slots: [u32; PRINTABLE_COUNT],
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    pub const fn new() -> Self {
        Self {
            slots: [0; PRINTABLE_COUNT],
        }
    }

    /// Count for `byte`; always 0 for non-printable bytes.
    pub fn get(&self, byte: u8) -> u32 {
        if is_printable(byte) {
            self.slots[usize::from(byte - FIRST_PRINTABLE)]
        } else {
            0
        }
    }

    /// Record one occurrence of `byte`. Returns whether it was counted.
    #[inline]
    pub fn record(&mut self, byte: u8) -> bool {
        if !is_printable(byte) {
            return false;
        }
        let slot = &mut self.slots[usize::from(byte - FIRST_PRINTABLE)];
        *slot = slot.saturating_add(1);
        true
    }

    /// Add every count of `other` into `self`.
    pub fn merge(&mut self, other: &Histogram) {
        for (slot, add) in self.slots.iter_mut().zip(other.slots.iter()) {
            *slot = slot.saturating_add(*add);
        }
    }

    /// Sum of all slots.
    pub fn total(&self) -> u64 {
        self.slots.iter().map(|&n| u64::from(n)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|&n| n == 0)
    }

    /// Characters with a non-zero count, ascending by code.
    pub fn iter_nonzero(&self) -> impl Iterator<Item = (char, u32)> + '_ {
        self.slots
            .iter()
            .zip(PRINTABLE)
            .filter(|(n, _)| **n > 0)
            .map(|(&n, byte)| (char::from(byte), n))
    }
}

/// Result of counting one request: the printable total and its histogram.
///
/// Tallies are additive, so a payload can be counted chunk by chunk with
/// `absorb` and produce the same result as counting it in one go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub total: u32,
    pub histogram: Histogram,
}

impl Tally {
    /// Fold one more chunk of payload into this tally.
    pub fn absorb(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            if self.histogram.record(byte) {
                self.total = self.total.saturating_add(1);
            }
        }
    }

    /// Combine two tallies.
    pub fn merge(&mut self, other: &Tally) {
        self.total = self.total.saturating_add(other.total);
        self.histogram.merge(&other.histogram);
    }
}

/// Count the printable bytes in `bytes`.
pub fn count(bytes: &[u8]) -> Tally {
    let mut tally = Tally::default();
    tally.absorb(bytes);
    tally
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printable_boundaries() {
        assert!(!is_printable(31));
        assert!(is_printable(32));
        assert!(is_printable(126));
        assert!(!is_printable(127));
        assert!(!is_printable(128));
        assert!(!is_printable(255));
        assert_eq!(PRINTABLE.count(), PRINTABLE_COUNT);
    }

    #[test]
    fn test_count_mixed() {
        let tally = count(b"Hi!\x01\x02");
        assert_eq!(tally.total, 3);
        assert_eq!(tally.histogram.get(b'H'), 1);
        assert_eq!(tally.histogram.get(b'i'), 1);
        assert_eq!(tally.histogram.get(b'!'), 1);
        assert_eq!(tally.histogram.get(0x01), 0);
    }

    #[test]
    fn test_count_matches_filter_over_all_bytes() {
        let all: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let tally = count(&all);
        let expected = all.iter().filter(|&&b| (32..=126).contains(&b)).count();
        assert_eq!(tally.total as usize, expected);
        assert_eq!(tally.histogram.total(), expected as u64);
        assert_eq!(tally.histogram.get(b' '), 16);
        assert_eq!(tally.histogram.get(b'~'), 16);
    }

    #[test]
    fn test_chunked_absorb_equals_whole() {
        let data = b"Hello World! \n\t\x01\x7F the quick brown fox ~~~";
        let whole = count(data);

        for chunk_size in [1, 2, 3, 7, 64] {
            let mut chunked = Tally::default();
            for chunk in data.chunks(chunk_size) {
                chunked.absorb(chunk);
            }
            assert_eq!(chunked, whole, "chunk size {chunk_size}");
        }

        let per_byte: u32 = data.iter().map(|b| count(&[*b]).total).sum();
        assert_eq!(per_byte, whole.total);
    }

    #[test]
    fn test_merge_is_elementwise_sum() {
        let mut a = count(b"aab");
        let b = count(b"bc\x00");
        a.merge(&b);
        assert_eq!(a.total, 5);
        assert_eq!(a.histogram.get(b'a'), 2);
        assert_eq!(a.histogram.get(b'b'), 2);
        assert_eq!(a.histogram.get(b'c'), 1);
    }

    #[test]
    fn test_iter_nonzero_is_ascending() {
        let tally = count(b"zyx ~!A");
        let chars: Vec<char> = tally.histogram.iter_nonzero().map(|(c, _)| c).collect();
        assert_eq!(chars, vec![' ', '!', 'A', 'x', 'y', 'z', '~']);
    }

    #[test]
    fn test_empty() {
        let tally = count(b"");
        assert_eq!(tally.total, 0);
        assert!(tally.histogram.is_empty());
        assert_eq!(tally.histogram.iter_nonzero().count(), 0);
    }
}
