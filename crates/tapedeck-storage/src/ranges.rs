//! Canonical interval arithmetic over `[start, end)` byte ranges.
//!
//! [`ByteRanges`] is backed by `rangemap::RangeSet`, which keeps the set
//! canonical: elements are disjoint, sorted by start, and adjacent or
//! overlapping inserts merge.

use std::ops::Range;

use rangemap::RangeSet;

/// A canonical set of disjoint, sorted `[start, end)` byte ranges.
///
/// Touching ranges merge (`[a, b)` followed by `[b, c)` becomes `[a, c)`),
/// empty ranges are ignored, and every operation produces canonical output.
#[derive(Clone, Debug)]
pub struct ByteRanges {
    set: RangeSet<u64>,
}

impl Default for ByteRanges {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ByteRanges {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for ByteRanges {}

impl ByteRanges {
    #[must_use]
    pub fn new() -> Self {
        Self {
            set: RangeSet::new(),
        }
    }

    #[must_use]
    pub fn from_range(range: Range<u64>) -> Self {
        let mut out = Self::new();
        out.insert(range);
        out
    }

    /// Add a range, merging with anything it touches or overlaps.
    pub fn insert(&mut self, range: Range<u64>) {
        if !range.is_empty() {
            self.set.insert(range);
        }
    }

    /// Remove all bytes of `range` from the set.
    pub fn remove(&mut self, range: Range<u64>) {
        if !range.is_empty() {
            self.set.remove(range);
        }
    }

    /// Whether `range` is fully covered. Empty ranges are trivially covered.
    #[must_use]
    pub fn contains(&self, range: Range<u64>) -> bool {
        if range.is_empty() {
            return true;
        }
        // Walk a cursor over the overlapping elements; any gap means a miss.
        let mut cursor = range.start;
        for r in self.set.overlapping(&range) {
            if r.start > cursor {
                return false;
            }
            if r.end > cursor {
                cursor = r.end;
                if cursor >= range.end {
                    return true;
                }
            }
        }
        cursor >= range.end
    }

    /// Canonical merged union of `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for r in other.iter() {
            out.insert(r);
        }
        out
    }

    /// Canonical set of bytes in `self` that are not in `other`.
    #[must_use]
    pub fn subtract(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for r in other.iter() {
            out.remove(r);
        }
        out
    }

    /// Complement of `self` intersected with `bound`: the bytes of `bound`
    /// this set does not cover.
    #[must_use]
    pub fn missing(&self, bound: Range<u64>) -> Self {
        let mut out = Self::new();
        if bound.is_empty() {
            return out;
        }
        for gap in self.set.gaps(&bound) {
            out.insert(gap);
        }
        out
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<Range<u64>> {
        self.set.iter().next().cloned()
    }

    /// Start of the first range beginning at or after `pos`.
    #[must_use]
    pub fn next_start_at_or_after(&self, pos: u64) -> Option<u64> {
        self.set
            .iter()
            .map(|r| r.start)
            .find(|&start| start >= pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = Range<u64>> + '_ {
        self.set.iter().cloned()
    }
}

impl FromIterator<Range<u64>> for ByteRanges {
    fn from_iter<I: IntoIterator<Item = Range<u64>>>(iter: I) -> Self {
        let mut out = Self::new();
        for r in iter {
            out.insert(r);
        }
        out
    }
}
