//! Sorted interval containers over guest physical addresses.

use core::cmp::Ordering;

/// A half-open address range `[start, end)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SurfaceInterval {
    pub start: u32,
    pub end: u32,
}

impl SurfaceInterval {
    pub const fn new(start: u32, end: u32) -> Self {
        // Reversed ranges are treated as empty.
        Self { start, end }
    }

    pub const fn from_size(addr: u32, size: u32) -> Self {
        Self::new(addr, addr.saturating_add(size))
    }

    pub const fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub const fn overlaps(&self, other: &SurfaceInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub const fn contains(&self, other: &SurfaceInterval) -> bool {
        other.is_empty() || (self.start <= other.start && other.end <= self.end)
    }

    pub fn intersect(&self, other: &SurfaceInterval) -> SurfaceInterval {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start >= end {
            SurfaceInterval::new(start, start)
        } else {
            SurfaceInterval::new(start, end)
        }
    }

    fn touches(&self, other: &SurfaceInterval) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    fn merge(&self, other: &SurfaceInterval) -> SurfaceInterval {
        SurfaceInterval::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Index of the first interval in `sorted` whose end lies past `addr`.
fn first_ending_after<T>(sorted: &[T], addr: u32, key: impl Fn(&T) -> SurfaceInterval) -> usize {
    sorted
        .binary_search_by(|entry| {
            if key(entry).end <= addr {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        })
        .unwrap_or_else(|idx| idx)
}

/// A set of disjoint, sorted intervals.
///
/// Invariants:
/// - Intervals are stored in ascending order.
/// - No intervals overlap or touch (adjacent intervals are merged).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IntervalSet {
    intervals: Vec<SurfaceInterval>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self { intervals: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = SurfaceInterval> + '_ {
        self.intervals.iter().copied()
    }

    pub fn total_len(&self) -> u64 {
        self.intervals.iter().map(|i| u64::from(i.len())).sum()
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
    }

    pub fn insert(&mut self, interval: SurfaceInterval) {
        if interval.is_empty() {
            return;
        }
        let first = first_ending_after(&self.intervals, interval.start.saturating_sub(1), |i| *i);
        let mut merged = interval;
        let mut last = first;
        while last < self.intervals.len() && self.intervals[last].touches(&merged) {
            merged = merged.merge(&self.intervals[last]);
            last += 1;
        }
        self.intervals.splice(first..last, [merged]);
    }

    pub fn remove(&mut self, interval: SurfaceInterval) {
        if interval.is_empty() {
            return;
        }
        let first = first_ending_after(&self.intervals, interval.start, |i| *i);
        let mut last = first;
        let mut remainder = Vec::with_capacity(2);
        while last < self.intervals.len() && self.intervals[last].start < interval.end {
            let current = self.intervals[last];
            if current.start < interval.start {
                remainder.push(SurfaceInterval::new(current.start, interval.start));
            }
            if current.end > interval.end {
                remainder.push(SurfaceInterval::new(interval.end, current.end));
            }
            last += 1;
        }
        self.intervals.splice(first..last, remainder);
    }

    pub fn intersects(&self, interval: SurfaceInterval) -> bool {
        self.first_overlap(interval).is_some()
    }

    /// First stored interval overlapping `interval`, clipped to it.
    pub fn first_overlap(&self, interval: SurfaceInterval) -> Option<SurfaceInterval> {
        if interval.is_empty() {
            return None;
        }
        let idx = first_ending_after(&self.intervals, interval.start, |i| *i);
        self.intervals
            .get(idx)
            .filter(|i| i.start < interval.end)
            .map(|i| i.intersect(&interval))
    }

    /// Stored intervals overlapping `interval`, clipped to it.
    pub fn overlapping(&self, interval: SurfaceInterval) -> impl Iterator<Item = SurfaceInterval> + '_ {
        let idx = first_ending_after(&self.intervals, interval.start, |i| *i);
        self.intervals[idx..]
            .iter()
            .take_while(move |i| i.start < interval.end && !interval.is_empty())
            .map(move |i| i.intersect(&interval))
    }

    pub fn contains(&self, interval: SurfaceInterval) -> bool {
        if interval.is_empty() {
            return true;
        }
        let idx = first_ending_after(&self.intervals, interval.start, |i| *i);
        self.intervals
            .get(idx)
            .is_some_and(|i| i.start <= interval.start && i.end >= interval.end)
    }

    /// Smallest interval covering every stored interval.
    pub fn bounds(&self) -> Option<SurfaceInterval> {
        Some(SurfaceInterval::new(self.intervals.first()?.start, self.intervals.last()?.end))
    }
}

/// Disjoint intervals, each mapped to a value. Setting a range overwrites
/// whatever it covered; neighbouring ranges with equal values are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalMap<V> {
    entries: Vec<(SurfaceInterval, V)>,
}

impl<V> Default for IntervalMap<V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<V: Copy + Eq> IntervalMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (SurfaceInterval, V)> + '_ {
        self.entries.iter().copied()
    }

    pub fn set(&mut self, interval: SurfaceInterval, value: V) {
        if interval.is_empty() {
            return;
        }
        self.remove(interval);
        let mut idx = first_ending_after(&self.entries, interval.start, |e| e.0);
        let mut merged = interval;
        if idx > 0 {
            let (prev, prev_value) = self.entries[idx - 1];
            if prev.end == merged.start && prev_value == value {
                merged.start = prev.start;
                idx -= 1;
                self.entries.remove(idx);
            }
        }
        if let Some(&(next, next_value)) = self.entries.get(idx) {
            if next.start == merged.end && next_value == value {
                merged.end = next.end;
                self.entries.remove(idx);
            }
        }
        self.entries.insert(idx, (merged, value));
    }

    pub fn remove(&mut self, interval: SurfaceInterval) {
        if interval.is_empty() {
            return;
        }
        let first = first_ending_after(&self.entries, interval.start, |e| e.0);
        let mut last = first;
        let mut remainder = Vec::with_capacity(2);
        while last < self.entries.len() && self.entries[last].0.start < interval.end {
            let (current, value) = self.entries[last];
            if current.start < interval.start {
                remainder.push((SurfaceInterval::new(current.start, interval.start), value));
            }
            if current.end > interval.end {
                remainder.push((SurfaceInterval::new(interval.end, current.end), value));
            }
            last += 1;
        }
        self.entries.splice(first..last, remainder);
    }

    /// Entries overlapping `interval`, unclipped.
    pub fn overlapping(&self, interval: SurfaceInterval) -> Vec<(SurfaceInterval, V)> {
        if interval.is_empty() {
            return Vec::new();
        }
        let idx = first_ending_after(&self.entries, interval.start, |e| e.0);
        self.entries[idx..]
            .iter()
            .take_while(|(i, _)| i.start < interval.end)
            .copied()
            .collect()
    }

    /// Whether every address of `interval` has a value.
    pub fn covers(&self, interval: SurfaceInterval) -> bool {
        let mut cursor = interval.start;
        for (i, _) in self.overlapping(interval) {
            if i.start > cursor {
                return false;
            }
            cursor = i.end;
            if cursor >= interval.end {
                return true;
            }
        }
        interval.is_empty()
    }

    /// Re-points the parts of `interval` mapped to `from` at `to`.
    pub fn replace_value(&mut self, interval: SurfaceInterval, from: V, to: V) {
        for (i, value) in self.overlapping(interval) {
            if value == from {
                self.set(i.intersect(&interval), to);
            }
        }
    }

    /// Drops every range mapped to `value`.
    pub fn remove_value(&mut self, value: V) {
        self.entries.retain(|(_, v)| *v != value);
    }

    pub fn intervals_of(&self, value: V) -> Vec<SurfaceInterval> {
        self.entries
            .iter()
            .filter(|(_, v)| *v == value)
            .map(|(i, _)| *i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn iv(start: u32, end: u32) -> SurfaceInterval {
        SurfaceInterval::new(start, end)
    }

    #[test]
    fn insert_merges_overlaps_and_adjacency() {
        let mut set = IntervalSet::new();
        set.insert(iv(10, 20));
        set.insert(iv(0, 5));
        set.insert(iv(5, 10));
        set.insert(iv(18, 25));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![iv(0, 25)]);
    }

    #[test]
    fn remove_splits_intervals() {
        let mut set = IntervalSet::new();
        set.insert(iv(0, 100));
        set.remove(iv(25, 75));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![iv(0, 25), iv(75, 100)]);
        assert!(set.intersects(iv(20, 30)));
        assert!(!set.intersects(iv(25, 75)));
        assert_eq!(set.first_overlap(iv(50, 90)), Some(iv(75, 90)));
    }

    #[test]
    fn map_set_overwrites_and_merges() {
        let mut map = IntervalMap::new();
        map.set(iv(0, 10), 1u32);
        map.set(iv(10, 20), 1);
        map.set(iv(5, 15), 2);
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(iv(0, 5), 1), (iv(5, 15), 2), (iv(15, 20), 1)]);

        map.replace_value(iv(0, 20), 1, 2);
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(iv(0, 20), 2)]);
        assert!(map.covers(iv(3, 17)));

        map.remove(iv(8, 9));
        assert!(!map.covers(iv(3, 17)));
        assert_eq!(map.overlapping(iv(8, 9)), vec![]);
    }

    proptest! {
        #[test]
        fn set_matches_bitmap_model(ops in prop::collection::vec((any::<bool>(), 0u32..256, 0u32..64), 1..64)) {
            let mut set = IntervalSet::new();
            let mut model = [false; 320];
            for (insert, start, len) in ops {
                let interval = iv(start, start + len);
                if insert {
                    set.insert(interval);
                } else {
                    set.remove(interval);
                }
                for bit in &mut model[start as usize..(start + len) as usize] {
                    *bit = insert;
                }
            }
            let mut rebuilt = [false; 320];
            let mut prev_end = None;
            for interval in set.iter() {
                prop_assert!(!interval.is_empty());
                if let Some(end) = prev_end {
                    prop_assert!(interval.start > end);
                }
                prev_end = Some(interval.end);
                for bit in &mut rebuilt[interval.start as usize..interval.end as usize] {
                    *bit = true;
                }
            }
            prop_assert_eq!(rebuilt, model);
        }
    }
}
