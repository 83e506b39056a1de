// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! RAII ownership of one reference to a cached event.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache::EventCache;
use crate::handle::EventHandle;
use crate::status::{EventStatus, WaitStatus};

/// Owns exactly one reference to a cached event and releases it on drop.
///
/// This is what a queue hands to callers that asked for a completion event.
/// Because [`release`](Self::release) consumes the guard, a guard can never
/// release its reference twice.
pub struct EventGuard {
    cache: Arc<EventCache>,
    handle: Option<EventHandle>,
}

impl EventGuard {
    /// Take over one reference that has already been counted.
    pub(crate) fn adopt(cache: Arc<EventCache>, handle: EventHandle) -> Self {
        Self {
            cache,
            handle: Some(handle),
        }
    }

    /// Return the guarded handle.
    pub fn handle(&self) -> EventHandle {
        self.handle.expect("guard already consumed")
    }

    /// Block until the event completes or `timeout` elapses.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<WaitStatus> {
        self.cache.wait(self.handle(), timeout)
    }

    /// Non-blocking completion check.
    pub fn status(&self) -> Result<EventStatus> {
        self.cache.status(self.handle())
    }

    /// Add a reference and wrap it in a second guard.
    pub fn try_clone(&self) -> Result<Self> {
        let handle = self.handle();
        self.cache.add_ref(handle)?;
        Ok(Self::adopt(Arc::clone(&self.cache), handle))
    }

    /// Release the reference now, surfacing any error.
    pub fn release(mut self) -> Result<()> {
        let handle = self.handle.take().expect("guard already consumed");
        self.cache.release(handle)
    }

    /// Disarm the guard; the caller becomes responsible for releasing the
    /// reference through [`EventCache::release`].
    pub fn into_handle(mut self) -> EventHandle {
        self.handle.take().expect("guard already consumed")
    }
}

impl Drop for EventGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = self.cache.release(handle) {
                debug!(%handle, %err, "failed to release event reference on drop");
            }
        }
    }
}

impl std::fmt::Debug for EventGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventGuard")
            .field("cache", &self.cache.id())
            .field("handle", &self.handle)
            .finish()
    }
}
