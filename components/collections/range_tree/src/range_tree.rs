//! An in-memory set of disjoint `[start, start+size)` extents, kept
//! automatically coalesced. Backs the metaslab allocator's view of free
//! (or, inverted, allocated) space within a metaslab.
use btree::BTreeMap;

/// A non-overlapping, auto-merging collection of byte extents.
///
/// Mirrors `range_tree_t`: segments that touch after an `add` are merged
/// into one, and a `remove` that only partially covers a segment splits it
/// rather than erroring.
#[derive(Default)]
pub struct RangeTree {
    // start -> size
    segments: BTreeMap<u64, u64>,
    space: u64,
}

impl RangeTree {
    pub fn new() -> Self {
        RangeTree { segments: BTreeMap::new(), space: 0 }
    }

    pub fn space(&self) -> u64 {
        self.space
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn clear(&mut self) {
        self.segments = BTreeMap::new();
        self.space = 0;
    }

    /// The segment, if any, whose range contains or immediately touches
    /// `start`, found by walking the ordered segment list. `O(n)`; callers
    /// that need this on a hot path should keep metaslab-sized trees only.
    fn find_touching(&self, start: u64, end: u64) -> Option<(u64, u64)> {
        for (&s, &len) in self.segments.iter() {
            let e = s + len;
            if e < start {
                continue;
            }
            if s > end {
                break;
            }
            return Some((s, len));
        }
        None
    }

    /// Adds `[start, start+size)`, merging with any segment it overlaps or
    /// touches. Panics if `size` is zero, matching the invariant callers
    /// are expected to uphold before calling in.
    pub fn add(&mut self, start: u64, size: u64) {
        assert!(size > 0, "cannot add a zero-length range");
        let end = start + size;

        let mut new_start = start;
        let mut new_end = end;

        // Gather and remove every segment that overlaps or is adjacent to
        // the new range, expanding the bounds to cover them.
        loop {
            match self.find_touching(new_start, new_end) {
                Some((s, len)) => {
                    let e = s + len;
                    if e < new_start || s > new_end {
                        break;
                    }
                    self.segments.remove(&s);
                    self.space -= len;
                    new_start = new_start.min(s);
                    new_end = new_end.max(e);
                }
                None => break,
            }
        }

        self.segments.insert(new_start, new_end - new_start);
        self.space += new_end - new_start;
    }

    /// Removes `[start, start+size)`, splitting the segment(s) that
    /// partially cover it. Panics if the range is not wholly contained in
    /// the tree, matching `range_tree_remove`'s assertion.
    pub fn remove(&mut self, start: u64, size: u64) {
        assert!(size > 0, "cannot remove a zero-length range");
        let end = start + size;

        let (seg_start, seg_len) = self
            .find_covering(start, end)
            .unwrap_or_else(|| panic!("range [{}, {}) not present in tree", start, end));
        let seg_end = seg_start + seg_len;

        self.segments.remove(&seg_start);
        self.space -= seg_len;

        if seg_start < start {
            self.segments.insert(seg_start, start - seg_start);
            self.space += start - seg_start;
        }
        if end < seg_end {
            self.segments.insert(end, seg_end - end);
            self.space += seg_end - end;
        }
    }

    fn find_covering(&self, start: u64, end: u64) -> Option<(u64, u64)> {
        for (&s, &len) in self.segments.iter() {
            let e = s + len;
            if s <= start && end <= e {
                return Some((s, len));
            }
            if s > start {
                break;
            }
        }
        None
    }

    pub fn contains(&self, start: u64, size: u64) -> bool {
        self.find_covering(start, start + size).is_some()
    }

    /// Returns the largest single segment, the allocator's fast path for
    /// the "largest free segment first" selection policy.
    pub fn find_largest(&self) -> Option<(u64, u64)> {
        self.segments
            .iter()
            .max_by_key(|(_, &len)| len)
            .map(|(&s, &len)| (s, len))
    }

    /// First segment at least `size` bytes long, in offset order (the
    /// allocator's first-fit policy).
    pub fn find_first_fit(&self, size: u64) -> Option<(u64, u64)> {
        self.segments
            .iter()
            .find(|(_, &len)| len >= size)
            .map(|(&s, &len)| (s, len))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.segments.iter().map(|(&s, &len)| (s, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_merges_adjacent_segments() {
        let mut t = RangeTree::new();
        t.add(0, 10);
        t.add(10, 10);
        assert_eq!(t.segment_count(), 1);
        assert_eq!(t.space(), 20);
        assert!(t.contains(5, 10));
    }

    #[test]
    fn add_merges_overlapping_segments() {
        let mut t = RangeTree::new();
        t.add(0, 10);
        t.add(5, 20);
        assert_eq!(t.segment_count(), 1);
        assert_eq!(t.space(), 25);
    }

    #[test]
    fn remove_splits_segment() {
        let mut t = RangeTree::new();
        t.add(0, 100);
        t.remove(40, 20);
        assert_eq!(t.segment_count(), 2);
        assert_eq!(t.space(), 80);
        assert!(t.contains(0, 40));
        assert!(t.contains(60, 40));
        assert!(!t.contains(40, 20));
    }

    #[test]
    fn remove_exact_segment_erases_it() {
        let mut t = RangeTree::new();
        t.add(0, 100);
        t.remove(0, 100);
        assert!(t.is_empty());
        assert_eq!(t.space(), 0);
    }

    #[test]
    fn find_largest_and_first_fit() {
        let mut t = RangeTree::new();
        t.add(0, 5);
        t.add(100, 50);
        t.add(200, 10);
        assert_eq!(t.find_largest(), Some((100, 50)));
        assert_eq!(t.find_first_fit(8), Some((100, 50)));
        assert_eq!(t.find_first_fit(3), Some((0, 5)));
        assert_eq!(t.find_first_fit(1000), None);
    }

    #[test]
    #[should_panic]
    fn remove_unmapped_range_panics() {
        let mut t = RangeTree::new();
        t.add(0, 10);
        t.remove(50, 10);
    }
}
