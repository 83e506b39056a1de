// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Call-count instrumentation for native backends.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::{BackendError, EventKind, NativeEvent, NativeEventBackend};

/// Per-call counters shared between a [`CountingBackend`] and whoever
/// inspects it.
///
/// Every call is counted when it is made, whether or not it succeeds.
#[derive(Debug, Default)]
pub struct CallCounter {
    counts: DashMap<&'static str, u64>,
}

impl CallCounter {
    /// Name recorded for [`NativeEventBackend::create`].
    pub const CREATE: &'static str = "create";
    /// Name recorded for [`NativeEventBackend::destroy`].
    pub const DESTROY: &'static str = "destroy";
    /// Name recorded for [`NativeEventBackend::reset`].
    pub const RESET: &'static str = "reset";
    /// Name recorded for [`NativeEventBackend::signal`].
    pub const SIGNAL: &'static str = "signal";
    /// Name recorded for [`NativeEventBackend::query`].
    pub const QUERY: &'static str = "query";
    /// Name recorded for [`NativeEventBackend::wait`].
    pub const WAIT: &'static str = "wait";

    /// Create an empty counter.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Count one call to `name`.
    pub fn record(&self, name: &'static str) {
        *self.counts.entry(name).or_insert(0) += 1;
    }

    /// Number of calls recorded for `name`.
    pub fn get(&self, name: &str) -> u64 {
        self.counts.get(name).map(|count| *count).unwrap_or(0)
    }

    /// Shorthand for `get(CallCounter::CREATE)`.
    pub fn creates(&self) -> u64 {
        self.get(Self::CREATE)
    }

    /// Shorthand for `get(CallCounter::DESTROY)`.
    pub fn destroys(&self) -> u64 {
        self.get(Self::DESTROY)
    }

    /// Zero the counter for `name`.
    pub fn reset(&self, name: &'static str) {
        self.counts.insert(name, 0);
    }

    /// Zero every counter.
    pub fn clear(&self) {
        self.counts.clear();
    }

    /// Sorted copy of all counters.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counts
            .iter()
            .map(|entry| (entry.key().to_string(), *entry.value()))
            .collect()
    }
}

/// Backend decorator that reports every call to a [`CallCounter`].
pub struct CountingBackend<B> {
    inner: B,
    counter: Arc<CallCounter>,
}

impl<B: NativeEventBackend> CountingBackend<B> {
    /// Wrap `inner`, reporting to `counter`.
    pub fn new(inner: B, counter: Arc<CallCounter>) -> Self {
        Self { inner, counter }
    }

    /// The counter this backend reports to.
    pub fn counter(&self) -> &Arc<CallCounter> {
        &self.counter
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }
}

impl<B: NativeEventBackend> NativeEventBackend for CountingBackend<B> {
    fn create(&self, kind: EventKind) -> Result<NativeEvent, BackendError> {
        self.counter.record(CallCounter::CREATE);
        self.inner.create(kind)
    }

    fn destroy(&self, event: NativeEvent) -> Result<(), BackendError> {
        self.counter.record(CallCounter::DESTROY);
        self.inner.destroy(event)
    }

    fn reset(&self, event: NativeEvent) -> Result<(), BackendError> {
        self.counter.record(CallCounter::RESET);
        self.inner.reset(event)
    }

    fn signal(&self, event: NativeEvent) -> Result<(), BackendError> {
        self.counter.record(CallCounter::SIGNAL);
        self.inner.signal(event)
    }

    fn query(&self, event: NativeEvent) -> Result<bool, BackendError> {
        self.counter.record(CallCounter::QUERY);
        self.inner.query(event)
    }

    fn wait(&self, event: NativeEvent, timeout: Option<Duration>) -> Result<bool, BackendError> {
        self.counter.record(CallCounter::WAIT);
        self.inner.wait(event, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::super::HostEventBackend;
    use super::*;

    #[test]
    fn counts_each_call() {
        let counter = CallCounter::new();
        let backend = CountingBackend::new(HostEventBackend::new(), Arc::clone(&counter));

        let event = backend.create(EventKind::discard()).unwrap();
        backend.signal(event).unwrap();
        backend.query(event).unwrap();
        backend.wait(event, None).unwrap();
        backend.reset(event).unwrap();
        backend.destroy(event).unwrap();

        assert_eq!(counter.creates(), 1);
        assert_eq!(counter.destroys(), 1);
        assert_eq!(counter.get(CallCounter::RESET), 1);
        assert_eq!(counter.get(CallCounter::SIGNAL), 1);
        assert_eq!(counter.get(CallCounter::QUERY), 1);
        assert_eq!(counter.get(CallCounter::WAIT), 1);
        assert_eq!(counter.get("unknown"), 0);
    }

    #[test]
    fn failed_calls_are_still_counted() {
        let counter = CallCounter::new();
        let backend = CountingBackend::new(HostEventBackend::with_limit(0), Arc::clone(&counter));

        assert!(backend.create(EventKind::discard()).is_err());
        assert_eq!(counter.creates(), 1);
    }

    #[test]
    fn reset_and_snapshot() {
        let counter = CallCounter::new();
        counter.record(CallCounter::CREATE);
        counter.record(CallCounter::CREATE);
        counter.record(CallCounter::DESTROY);

        let snapshot = counter.snapshot();
        assert_eq!(snapshot.get("create"), Some(&2));
        assert_eq!(snapshot.get("destroy"), Some(&1));

        counter.reset(CallCounter::CREATE);
        assert_eq!(counter.creates(), 0);
        assert_eq!(counter.destroys(), 1);

        counter.clear();
        assert!(counter.snapshot().is_empty());
    }
}
