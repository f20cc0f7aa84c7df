use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of [`CacheStats`], suitable for profiling overlays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub surfaces_created: u64,
    pub surfaces_destroyed: u64,
    pub uploads: u64,
    pub downloads: u64,
    pub fills: u64,
    pub copies: u64,
    pub reinterpretations: u64,
    pub invalid_marks: u64,
    pub skipped_invalidations: u64,
    pub gc_sweeps: u64,
}

/// Counters for the surface cache.
///
/// Updated on the render thread with relaxed ordering; safe to read from
/// another thread.
#[derive(Debug, Default)]
pub struct CacheStats {
    surfaces_created: AtomicU64,
    surfaces_destroyed: AtomicU64,
    uploads: AtomicU64,
    downloads: AtomicU64,
    fills: AtomicU64,
    copies: AtomicU64,
    reinterpretations: AtomicU64,
    /// Surfaces that had a region marked invalid by a guest write.
    invalid_marks: AtomicU64,
    /// Invalidations answered without consulting any surface.
    skipped_invalidations: AtomicU64,
    gc_sweeps: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_surfaces_created(&self) {
        self.surfaces_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_surfaces_destroyed(&self) {
        self.surfaces_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_uploads(&self) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_downloads(&self) {
        self.downloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fills(&self) {
        self.fills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_copies(&self) {
        self.copies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reinterpretations(&self) {
        self.reinterpretations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_invalid_marks(&self) {
        self.invalid_marks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped_invalidations(&self) {
        self.skipped_invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_gc_sweeps(&self) {
        self.gc_sweeps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            surfaces_created: self.surfaces_created.load(Ordering::Relaxed),
            surfaces_destroyed: self.surfaces_destroyed.load(Ordering::Relaxed),
            uploads: self.uploads.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            fills: self.fills.load(Ordering::Relaxed),
            copies: self.copies.load(Ordering::Relaxed),
            reinterpretations: self.reinterpretations.load(Ordering::Relaxed),
            invalid_marks: self.invalid_marks.load(Ordering::Relaxed),
            skipped_invalidations: self.skipped_invalidations.load(Ordering::Relaxed),
            gc_sweeps: self.gc_sweeps.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let stats = CacheStats::new();
        stats.inc_uploads();
        stats.inc_uploads();
        stats.inc_skipped_invalidations();
        let snap = stats.snapshot();
        assert_eq!(snap.uploads, 2);
        assert_eq!(snap.skipped_invalidations, 1);
        assert_eq!(snap.downloads, 0);
    }
}
