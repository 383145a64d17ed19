/// State of one row in the [`BinIndexCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinSlot {
    /// Not resolved since the last invalidation.
    #[default]
    Pending,
    /// Outside the binned domain on at least one axis.
    Overflow,
    Bin(usize),
}

/// Memoized row → flat bin mapping, owned by a single histogram engine.
#[derive(Debug, Clone, Default)]
pub struct BinIndexCache {
    slots: Vec<BinSlot>,
}

impl BinIndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize to `rows` entries and mark every entry pending.
    pub fn invalidate_all(&mut self, rows: usize) {
        self.slots.clear();
        self.slots.resize(rows, BinSlot::Pending);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Rows outside the cache read as pending.
    pub fn get(&self, row: usize) -> BinSlot {
        self.slots.get(row).copied().unwrap_or_default()
    }

    /// Cached bin of `row`, computing and storing it with `locate` on a miss.
    /// Rows beyond the cache are computed but not stored.
    pub fn resolve(&mut self, row: usize, locate: impl FnOnce() -> Option<usize>) -> Option<usize> {
        match self.get(row) {
            BinSlot::Bin(b) => return Some(b),
            BinSlot::Overflow => return None,
            BinSlot::Pending => {}
        }
        let bin = locate();
        if let Some(slot) = self.slots.get_mut(row) {
            *slot = bin.map_or(BinSlot::Overflow, BinSlot::Bin);
        }
        bin
    }

    pub fn resolved_count(&self) -> usize {
        self.slots.iter().filter(|s| **s != BinSlot::Pending).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_memoizes_bins_and_overflow() {
        let mut cache = BinIndexCache::new();
        cache.invalidate_all(3);
        let mut calls = 0;
        assert_eq!(cache.resolve(0, || { calls += 1; Some(4) }), Some(4));
        assert_eq!(cache.resolve(0, || { calls += 1; Some(9) }), Some(4));
        assert_eq!(cache.resolve(1, || { calls += 1; None }), None);
        assert_eq!(cache.resolve(1, || { calls += 1; Some(2) }), None);
        assert_eq!(calls, 2);
        assert_eq!(cache.get(0), BinSlot::Bin(4));
        assert_eq!(cache.get(1), BinSlot::Overflow);
        assert_eq!(cache.get(2), BinSlot::Pending);
        assert_eq!(cache.resolved_count(), 2);
    }

    #[test]
    fn invalidate_resets_and_resizes() {
        let mut cache = BinIndexCache::new();
        cache.invalidate_all(2);
        cache.resolve(0, || Some(1));
        cache.invalidate_all(5);
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.resolved_count(), 0);
        assert_eq!(cache.get(0), BinSlot::Pending);
    }

    #[test]
    fn rows_past_the_end_are_not_stored() {
        let mut cache = BinIndexCache::new();
        cache.invalidate_all(1);
        assert_eq!(cache.resolve(7, || Some(3)), Some(3));
        assert_eq!(cache.get(7), BinSlot::Pending);
        assert_eq!(cache.len(), 1);
    }
}
