// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counters of an [`EventCache`](crate::EventCache).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// `acquire` calls, successful or not.
    pub acquires: u64,
    /// Acquires served from a free list.
    pub hits: u64,
    /// Acquires that had to create a native primitive.
    pub misses: u64,
    /// Times an entry dropped its last reference and became idle.
    pub reclaimed: u64,
    /// Native primitives created.
    pub created: u64,
    /// Native primitives destroyed.
    pub destroyed: u64,
    /// Idle entries destroyed to make room under the capacity limit.
    pub evicted: u64,
    /// Entries currently in the arena.
    pub entries: usize,
    /// Entries currently waiting on a free list.
    pub idle: usize,
}

#[derive(Default)]
pub(crate) struct StatsCounters {
    acquires: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    reclaimed: AtomicU64,
    created: AtomicU64,
    destroyed: AtomicU64,
    evicted: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn acquire(&self) {
        self.acquires.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reclaim(&self) {
        self.reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn create(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn evict(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: usize, idle: usize) -> CacheStats {
        CacheStats {
            acquires: self.acquires.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            entries,
            idle,
        }
    }
}
