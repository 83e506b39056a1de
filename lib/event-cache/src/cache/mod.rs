// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Pool of reusable native events, partitioned by [`EventKind`].
//!
//! Entries live in an arena keyed by [`EntryKey`]; idle entries are tracked
//! by key on one free list per kind. Each entry carries its own lock and a
//! generation counter, so handles are plain ids that can be validated
//! without pointers into the arena.

pub(crate) mod entry;
mod stats;

use anyhow::{anyhow, Result};
use dashmap::DashMap;
use parking_lot::Mutex as ParkingMutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};
use validator::Validate;

use crate::backend::{EventKind, NativeEvent, NativeEventBackend};
use crate::config::{EventCacheConfig, ReusePolicy};
use crate::error::EventCacheError;
use crate::guard::EventGuard;
use crate::handle::EventHandle;
use crate::status::{EventStatus, WaitStatus};

use entry::{CacheEntry, EntryError, EntryKey, Released};
pub use stats::CacheStats;
use stats::StatsCounters;

const MAX_ENTRY_INDEX: u32 = u32::MAX;

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

/// Per-queue cache of native completion events.
///
/// The cache supplies a handle per enqueue ([`acquire`](Self::acquire)),
/// takes the queue's reference back once the work is known complete
/// ([`retire`](Self::retire)), and recycles the primitive when the last
/// reference is gone. Native creations therefore track the peak number of
/// unretired handles rather than the number of enqueues.
pub struct EventCache {
    id: u64,
    config: EventCacheConfig,
    backend: Arc<dyn NativeEventBackend>,
    entries: DashMap<EntryKey, Arc<CacheEntry>>,
    free_lists: ParkingMutex<HashMap<EventKind, VecDeque<EntryKey>>>,
    next_index: AtomicU32,
    live: AtomicUsize,
    stats: StatsCounters,
    shutdown: AtomicBool,
}

impl EventCache {
    /// Create a cache over `backend` with the default configuration.
    pub fn new(backend: Arc<dyn NativeEventBackend>) -> Arc<Self> {
        Self::build(backend, EventCacheConfig::default())
    }

    /// Create a cache over `backend` with a validated configuration.
    pub fn with_config(
        backend: Arc<dyn NativeEventBackend>,
        config: EventCacheConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Self::build(backend, config))
    }

    fn build(backend: Arc<dyn NativeEventBackend>, config: EventCacheConfig) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
            config,
            backend,
            entries: DashMap::new(),
            free_lists: ParkingMutex::new(HashMap::new()),
            next_index: AtomicU32::new(0),
            live: AtomicUsize::new(0),
            stats: StatsCounters::default(),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Id stamped into every handle this cache produces.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The configuration this cache was built with.
    pub fn config(&self) -> &EventCacheConfig {
        &self.config
    }

    /// Hand out a handle of the requested kind with a reference count of one.
    ///
    /// Idle entries of the same kind are reset and reused; otherwise a new
    /// native primitive is created. Creation failures surface as
    /// [`EventCacheError::ResourceExhausted`] and are not retried.
    pub fn acquire(&self, kind: EventKind) -> Result<EventHandle> {
        self.ensure_running()?;
        self.stats.acquire();

        while let Some(entry) = self.pop_idle(kind) {
            if let Some(handle) = self.reuse_entry(entry)? {
                self.stats.hit();
                return Ok(handle);
            }
        }

        self.create_entry(kind)
    }

    /// Add a reference to a live handle.
    pub fn add_ref(&self, handle: EventHandle) -> Result<()> {
        let entry = self.entry_for(handle)?;
        let refcount = entry
            .add_ref(handle.generation())
            .map_err(|err| self.entry_error(handle, err))?;
        trace!(%handle, refcount, "added event reference");
        Ok(())
    }

    /// Drop one reference. The last release makes the entry reusable.
    ///
    /// Releasing a handle whose count already reached zero is reported as
    /// [`EventCacheError::InvalidState`].
    pub fn release(&self, handle: EventHandle) -> Result<()> {
        let entry = self.entry_for(handle)?;
        let released = entry
            .release(handle.generation())
            .map_err(|err| self.entry_error(handle, err))?;
        self.finish_release(&entry, handle, released);
        Ok(())
    }

    /// Drop the reference held by the queue once the work behind `handle`
    /// is known complete.
    ///
    /// For discard events this is the last reference and the primitive is
    /// reclaimed immediately. Visible events stay alive until the caller
    /// releases its own reference.
    pub fn retire(&self, handle: EventHandle) -> Result<()> {
        let entry = self.entry_for(handle)?;
        let released = entry
            .retire(handle.generation())
            .map_err(|err| self.entry_error(handle, err))?;
        self.finish_release(&entry, handle, released);
        Ok(())
    }

    /// Block until the primitive behind `handle` is signaled.
    ///
    /// Does not change the reference count. A time-out leaves the handle in
    /// use; only a release can reclaim it.
    pub fn wait(&self, handle: EventHandle, timeout: Option<Duration>) -> Result<WaitStatus> {
        let primitive = self.native_event(handle)?;
        let signaled = self
            .backend
            .wait(primitive, timeout)
            .map_err(EventCacheError::from)?;
        Ok(WaitStatus::from_signaled(signaled))
    }

    /// Wait on several handles, stopping at the first time-out.
    ///
    /// The timeout applies to each handle individually.
    pub fn wait_all(&self, handles: &[EventHandle], timeout: Option<Duration>) -> Result<WaitStatus> {
        for handle in handles {
            if self.wait(*handle, timeout)? == WaitStatus::TimedOut {
                return Ok(WaitStatus::TimedOut);
            }
        }
        Ok(WaitStatus::Completed)
    }

    /// Non-blocking completion check.
    pub fn status(&self, handle: EventHandle) -> Result<EventStatus> {
        let primitive = self.native_event(handle)?;
        let signaled = self
            .backend
            .query(primitive)
            .map_err(EventCacheError::from)?;
        Ok(if signaled {
            EventStatus::Complete
        } else {
            EventStatus::Pending
        })
    }

    /// Current reference count of a live handle.
    pub fn refcount(&self, handle: EventHandle) -> Result<u32> {
        let entry = self.entry_for(handle)?;
        entry
            .refcount_for(handle.generation())
            .map_err(|err| self.entry_error(handle, err).into())
    }

    /// Native primitive behind a live handle, for backend interop.
    pub fn native_event(&self, handle: EventHandle) -> Result<NativeEvent> {
        let entry = self.entry_for(handle)?;
        entry
            .primitive_for(handle.generation())
            .map_err(|err| self.entry_error(handle, err).into())
    }

    /// Wrap one already-counted reference of `handle` in an [`EventGuard`].
    pub fn adopt(self: &Arc<Self>, handle: EventHandle) -> EventGuard {
        EventGuard::adopt(Arc::clone(self), handle)
    }

    /// Destroy every native primitive, including ones still referenced.
    ///
    /// Idempotent. Destruction failures are logged and skipped since nothing
    /// can use the primitives afterwards. Later operations fail with
    /// [`EventCacheError::Shutdown`].
    pub fn teardown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        self.free_lists.lock().clear();

        let entries: Vec<Arc<CacheEntry>> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut outstanding = 0usize;
        for entry in &entries {
            if entry.is_in_use() {
                outstanding += 1;
            }
            self.destroy_entry(entry);
        }
        self.entries.clear();

        if outstanding > 0 {
            warn!(
                cache = self.id,
                outstanding, "event cache torn down with referenced handles"
            );
        }
        debug!(cache = self.id, entries = entries.len(), "event cache torn down");
    }

    /// Returns `true` once [`teardown`](Self::teardown) has run.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        let idle = self.free_lists.lock().values().map(VecDeque::len).sum();
        self.stats.snapshot(self.entries.len(), idle)
    }

    /// Number of idle entries of `kind`.
    pub fn idle_count(&self, kind: EventKind) -> usize {
        self.free_lists
            .lock()
            .get(&kind)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    pub(crate) fn signal(&self, handle: EventHandle) -> Result<()> {
        let primitive = self.native_event(handle)?;
        self.backend
            .signal(primitive)
            .map_err(EventCacheError::from)?;
        Ok(())
    }

    // ── Internal helpers ──────────────────────────────────────────────

    fn reuse_entry(&self, entry: Arc<CacheEntry>) -> Result<Option<EventHandle>> {
        let primitive = entry
            .idle_primitive()
            .map_err(|err| self.reuse_error(err))?;

        if let Err(err) = self.backend.reset(primitive) {
            error!(key = %entry.key(), %primitive, %err, "failed to reset cached event");
            self.discard_entry(&entry);
            return Err(EventCacheError::from(err).into());
        }

        match entry.begin_generation() {
            Ok(generation) => {
                let handle = entry.key().handle(self.id, generation);
                trace!(%handle, "reusing cached event");
                Ok(Some(handle))
            }
            Err(EntryError::GenerationOverflow { key }) => {
                trace!(%key, "retiring cache entry after exhausting generation space");
                self.discard_entry(&entry);
                Ok(None)
            }
            Err(err) => Err(self.reuse_error(err)),
        }
    }

    fn create_entry(&self, kind: EventKind) -> Result<EventHandle> {
        self.reserve_slot(kind)?;

        let primitive = match self.backend.create(kind) {
            Ok(primitive) => primitive,
            Err(err) => {
                self.live.fetch_sub(1, Ordering::AcqRel);
                return Err(EventCacheError::ResourceExhausted {
                    kind,
                    reason: err.to_string(),
                }
                .into());
            }
        };
        self.stats.miss();
        self.stats.create();

        let index = match self
            .next_index
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < MAX_ENTRY_INDEX).then_some(current + 1)
            }) {
            Ok(index) => index,
            Err(_) => {
                self.destroy_primitive(primitive);
                return Err(EventCacheError::ResourceExhausted {
                    kind,
                    reason: format!(
                        "entry index space exhausted ({} entries)",
                        (MAX_ENTRY_INDEX as u64) + 1
                    ),
                }
                .into());
            }
        };

        let key = EntryKey::new(index);
        let entry = Arc::new(CacheEntry::new(key, kind, primitive));
        let generation = entry
            .begin_generation()
            .map_err(|err| anyhow!("fresh cache entry rejected first generation: {}", err))?;
        self.entries.insert(key, Arc::clone(&entry));

        // teardown may have swept the arena before the insert landed
        if self.is_shutdown() {
            self.discard_entry(&entry);
            return Err(EventCacheError::Shutdown.into());
        }

        let handle = key.handle(self.id, generation);
        debug!(%handle, %kind, %primitive, "created native event on cache miss");
        Ok(handle)
    }

    /// Count one more live primitive. At the configured limit, idle entries
    /// of other kinds are destroyed (oldest first) to make room.
    fn reserve_slot(&self, kind: EventKind) -> Result<()> {
        let Some(limit) = self.config.max_events else {
            self.live.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        };

        loop {
            let reserved = self
                .live
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    (current < limit).then_some(current + 1)
                });
            match reserved {
                Ok(_) => return Ok(()),
                Err(live) => {
                    if !self.evict_idle() {
                        return Err(EventCacheError::ResourceExhausted {
                            kind,
                            reason: format!(
                                "cache limit of {} live events reached ({} in use)",
                                limit, live
                            ),
                        }
                        .into());
                    }
                }
            }
        }
    }

    /// Destroy the oldest idle entry of the first kind that has one.
    fn evict_idle(&self) -> bool {
        loop {
            let key = {
                let mut free_lists = self.free_lists.lock();
                match free_lists.values_mut().find_map(VecDeque::pop_front) {
                    Some(key) => key,
                    None => return false,
                }
            };
            if let Some(entry) = self.entries.get(&key).map(|guard| Arc::clone(guard.value())) {
                debug!(
                    key = %entry.key(),
                    kind = %entry.kind(),
                    "evicting idle event to stay within capacity"
                );
                self.stats.evict();
                self.discard_entry(&entry);
                return true;
            }
        }
    }

    fn finish_release(&self, entry: &Arc<CacheEntry>, handle: EventHandle, released: Released) {
        match released {
            Released::Retained(refcount) => {
                trace!(%handle, refcount, "dropped event reference");
            }
            Released::Idle => {
                self.stats.reclaim();
                self.push_idle(entry);
                trace!(%handle, "event reclaimed into free list");
            }
        }
    }

    fn pop_idle(&self, kind: EventKind) -> Option<Arc<CacheEntry>> {
        loop {
            let key = {
                let mut free_lists = self.free_lists.lock();
                let free = free_lists.get_mut(&kind)?;
                match self.config.reuse_policy {
                    ReusePolicy::Fifo => free.pop_front(),
                    ReusePolicy::Lifo => free.pop_back(),
                }
            }?;
            if let Some(entry) = self.entries.get(&key).map(|guard| Arc::clone(guard.value())) {
                return Some(entry);
            }
        }
    }

    fn push_idle(&self, entry: &Arc<CacheEntry>) {
        let mut free_lists = self.free_lists.lock();
        if self.is_shutdown() {
            return;
        }
        free_lists
            .entry(entry.kind())
            .or_default()
            .push_back(entry.key());
    }

    /// Remove an entry from the arena and destroy its primitive.
    fn discard_entry(&self, entry: &Arc<CacheEntry>) {
        self.entries.remove(&entry.key());
        self.destroy_entry(entry);
    }

    fn destroy_entry(&self, entry: &Arc<CacheEntry>) {
        if let Some(primitive) = entry.take_primitive() {
            self.destroy_primitive(primitive);
        }
    }

    fn destroy_primitive(&self, primitive: NativeEvent) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        match self.backend.destroy(primitive) {
            Ok(()) => self.stats.destroy(),
            Err(err) => error!(cache = self.id, %primitive, %err, "failed to destroy native event"),
        }
    }

    fn entry_for(&self, handle: EventHandle) -> Result<Arc<CacheEntry>> {
        if self.is_shutdown() {
            return Err(EventCacheError::Shutdown.into());
        }
        if handle.cache_id() != self.id {
            return Err(EventCacheError::InvalidState {
                handle,
                reason: format!(
                    "handle belongs to cache {}, not cache {}",
                    handle.cache_id(),
                    self.id
                ),
            }
            .into());
        }
        self.entries
            .get(&EntryKey::from_handle(handle))
            .map(|guard| Arc::clone(guard.value()))
            .ok_or_else(|| {
                EventCacheError::InvalidState {
                    handle,
                    reason: "no such cache entry".to_string(),
                }
                .into()
            })
    }

    fn entry_error(&self, handle: EventHandle, err: EntryError) -> EventCacheError {
        match err {
            EntryError::Destroyed { .. } => EventCacheError::Shutdown,
            other => EventCacheError::InvalidState {
                handle,
                reason: other.to_string(),
            },
        }
    }

    fn reuse_error(&self, err: EntryError) -> anyhow::Error {
        match err {
            EntryError::Destroyed { .. } => EventCacheError::Shutdown.into(),
            other => anyhow!("free list held an unusable entry: {}", other),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shutdown() {
            return Err(EventCacheError::Shutdown.into());
        }
        Ok(())
    }
}

impl Drop for EventCache {
    fn drop(&mut self) {
        self.teardown();
    }
}
