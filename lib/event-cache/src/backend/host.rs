// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-process native event backend.

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex as ParkingMutex};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{BackendError, EventKind, NativeEvent, NativeEventBackend};

/// Host-memory implementation of the native primitive.
///
/// Each primitive is a flag guarded by a mutex plus a condition variable.
/// An optional limit on live primitives models device-imposed caps.
pub struct HostEventBackend {
    events: DashMap<NativeEvent, Arc<HostEvent>>,
    next_id: AtomicU64,
    live: AtomicUsize,
    limit: Option<usize>,
}

struct HostEvent {
    kind: EventKind,
    state: ParkingMutex<HostEventState>,
    cond: Condvar,
}

#[derive(Default)]
struct HostEventState {
    signaled: bool,
    destroyed: bool,
}

impl HostEventBackend {
    /// Create a backend without a live-primitive limit.
    pub fn new() -> Self {
        Self {
            events: DashMap::new(),
            next_id: AtomicU64::new(1),
            live: AtomicUsize::new(0),
            limit: None,
        }
    }

    /// Create a backend that refuses to hold more than `limit` primitives.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Number of primitives currently alive.
    pub fn live_events(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Kind the primitive was created with.
    pub fn kind_of(&self, event: NativeEvent) -> Option<EventKind> {
        self.events.get(&event).map(|entry| entry.kind)
    }

    fn lookup(&self, event: NativeEvent) -> Result<Arc<HostEvent>, BackendError> {
        self.events
            .get(&event)
            .map(|guard| guard.clone())
            .ok_or(BackendError::UnknownEvent(event))
    }
}

impl Default for HostEventBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeEventBackend for HostEventBackend {
    fn create(&self, kind: EventKind) -> Result<NativeEvent, BackendError> {
        match self.limit {
            Some(limit) => {
                self.live
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                        (current < limit).then_some(current + 1)
                    })
                    .map_err(|_| BackendError::OutOfResources { limit })?;
            }
            None => {
                self.live.fetch_add(1, Ordering::AcqRel);
            }
        }

        let event = NativeEvent::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.events.insert(
            event,
            Arc::new(HostEvent {
                kind,
                state: ParkingMutex::new(HostEventState::default()),
                cond: Condvar::new(),
            }),
        );
        Ok(event)
    }

    fn destroy(&self, event: NativeEvent) -> Result<(), BackendError> {
        let (_, host) = self
            .events
            .remove(&event)
            .ok_or(BackendError::UnknownEvent(event))?;
        self.live.fetch_sub(1, Ordering::AcqRel);

        // wake anyone still blocked so they observe the destruction
        host.state.lock().destroyed = true;
        host.cond.notify_all();
        Ok(())
    }

    fn reset(&self, event: NativeEvent) -> Result<(), BackendError> {
        let host = self.lookup(event)?;
        host.state.lock().signaled = false;
        Ok(())
    }

    fn signal(&self, event: NativeEvent) -> Result<(), BackendError> {
        let host = self.lookup(event)?;
        host.state.lock().signaled = true;
        host.cond.notify_all();
        Ok(())
    }

    fn query(&self, event: NativeEvent) -> Result<bool, BackendError> {
        let host = self.lookup(event)?;
        let signaled = host.state.lock().signaled;
        Ok(signaled)
    }

    fn wait(&self, event: NativeEvent, timeout: Option<Duration>) -> Result<bool, BackendError> {
        let host = self.lookup(event)?;
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        let mut state = host.state.lock();
        loop {
            if state.destroyed {
                return Err(BackendError::UnknownEvent(event));
            }
            if state.signaled {
                return Ok(true);
            }
            match deadline {
                Some(deadline) => {
                    if host.cond.wait_until(&mut state, deadline).timed_out() {
                        return Ok(state.signaled);
                    }
                }
                None => host.cond.wait(&mut state),
            }
        }
    }
}
