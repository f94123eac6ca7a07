//! Lightweight global metrics for BirchDB.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - структурные события дерева (split / merge)
//! - корень (рост / усадка высоты)
//! - оборот страниц (публикации / освобождения copy-on-write)

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// ----- Tree structure -----
static TREE_SPLITS: AtomicU64 = AtomicU64::new(0);
static TREE_MERGES: AtomicU64 = AtomicU64::new(0);

// ----- Root -----
static ROOT_GROWS: AtomicU64 = AtomicU64::new(0);
static ROOT_SHRINKS: AtomicU64 = AtomicU64::new(0);

// ----- Page turnover (copy-on-write) -----
static PAGES_PUBLISHED: AtomicU64 = AtomicU64::new(0);
static PAGES_FREED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    // Tree structure
    pub tree_splits: u64,
    pub tree_merges: u64,

    // Root
    pub root_grows: u64,
    pub root_shrinks: u64,

    // Page turnover
    pub pages_published: u64,
    pub pages_freed: u64,
}

impl MetricsSnapshot {
    /// Число живых страниц по версии счётчиков (published - freed).
    pub fn pages_live(&self) -> u64 {
        self.pages_published.saturating_sub(self.pages_freed)
    }
}

// ----- Recorders (tree structure) -----
pub fn record_split() {
    TREE_SPLITS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_merge() {
    TREE_MERGES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (root) -----
pub fn record_root_grow() {
    ROOT_GROWS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_root_shrink() {
    ROOT_SHRINKS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (page turnover) -----
pub fn record_page_published() {
    PAGES_PUBLISHED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_page_freed() {
    PAGES_FREED.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        tree_splits: TREE_SPLITS.load(Ordering::Relaxed),
        tree_merges: TREE_MERGES.load(Ordering::Relaxed),

        root_grows: ROOT_GROWS.load(Ordering::Relaxed),
        root_shrinks: ROOT_SHRINKS.load(Ordering::Relaxed),

        pages_published: PAGES_PUBLISHED.load(Ordering::Relaxed),
        pages_freed: PAGES_FREED.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    TREE_SPLITS.store(0, Ordering::Relaxed);
    TREE_MERGES.store(0, Ordering::Relaxed);

    ROOT_GROWS.store(0, Ordering::Relaxed);
    ROOT_SHRINKS.store(0, Ordering::Relaxed);

    PAGES_PUBLISHED.store(0, Ordering::Relaxed);
    PAGES_FREED.store(0, Ordering::Relaxed);
}
