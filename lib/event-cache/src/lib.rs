// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

// Native event seam
pub mod backend;

// Pooling
mod cache;
mod guard;
mod handle;
mod status;

// Queue front-end
pub mod queue;

// Ambient
pub mod config;
mod error;
pub mod logging;

// ── Re-exports ───────────────────────────────────────────────────────

pub use backend::{
    BackendError, CallCounter, CountingBackend, EventKind, HostEventBackend, NativeEvent,
    NativeEventBackend, Visibility,
};
pub use cache::{CacheStats, EventCache};
pub use config::{EventCacheConfig, ReusePolicy};
pub use error::EventCacheError;
pub use guard::EventGuard;
pub use handle::EventHandle;
pub use queue::{CommandQueue, QueueConfig, SubmissionMode};
pub use status::{EventStatus, Generation, WaitStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn create_cache() -> (Arc<EventCache>, Arc<CallCounter>) {
        let counter = CallCounter::new();
        let backend = CountingBackend::new(HostEventBackend::new(), Arc::clone(&counter));
        (EventCache::new(Arc::new(backend)), counter)
    }

    #[test]
    fn guard_releases_on_drop() -> Result<()> {
        let (cache, _) = create_cache();
        let handle = cache.acquire(EventKind::visible())?;
        {
            let _guard = cache.adopt(handle);
        }
        assert_eq!(cache.idle_count(EventKind::visible()), 1);
        assert!(cache.refcount(handle).is_err());
        Ok(())
    }

    #[test]
    fn cloned_guard_keeps_event_alive() -> Result<()> {
        let (cache, _) = create_cache();
        let guard = cache.adopt(cache.acquire(EventKind::visible())?);
        let clone = guard.try_clone()?;
        assert_eq!(cache.refcount(guard.handle())?, 2);

        guard.release()?;
        assert_eq!(cache.refcount(clone.handle())?, 1);
        assert_eq!(cache.idle_count(EventKind::visible()), 0);

        drop(clone);
        assert_eq!(cache.idle_count(EventKind::visible()), 1);
        Ok(())
    }

    #[test]
    fn into_handle_disarms_guard() -> Result<()> {
        let (cache, _) = create_cache();
        let guard = cache.adopt(cache.acquire(EventKind::visible())?);
        let handle = guard.into_handle();
        assert_eq!(cache.refcount(handle)?, 1);

        cache.release(handle)?;
        let err = cache.release(handle).unwrap_err();
        assert!(err.downcast::<EventCacheError>()?.is_invalid_state());
        Ok(())
    }

    #[test]
    fn guard_wait_sees_signal_from_other_thread() -> Result<()> {
        let (cache, _) = create_cache();
        let guard = cache.adopt(cache.acquire(EventKind::visible())?);
        let handle = guard.handle();

        thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(10));
                cache.signal(handle).unwrap();
            });
            assert_eq!(guard.wait(None).unwrap(), WaitStatus::Completed);
        });
        assert_eq!(guard.status()?, EventStatus::Complete);
        Ok(())
    }

    #[test]
    fn guard_wait_times_out_without_signal() -> Result<()> {
        let (cache, _) = create_cache();
        let guard = cache.adopt(cache.acquire(EventKind::visible())?);
        assert_eq!(
            guard.wait(Some(Duration::from_millis(5)))?,
            WaitStatus::TimedOut
        );
        assert_eq!(cache.refcount(guard.handle())?, 1);
        Ok(())
    }

    #[test]
    fn guard_outliving_teardown_reports_shutdown() -> Result<()> {
        let (cache, counter) = create_cache();
        let guard = cache.adopt(cache.acquire(EventKind::visible())?);
        cache.teardown();

        let err = guard.release().unwrap_err();
        assert_eq!(err.downcast::<EventCacheError>()?, EventCacheError::Shutdown);
        assert_eq!(counter.destroys(), 1);
        Ok(())
    }

    #[test]
    fn native_event_exposes_backend_primitive() -> Result<()> {
        let backend = Arc::new(HostEventBackend::new());
        let cache = EventCache::new(backend.clone());
        let handle = cache.acquire(EventKind::discard().with_profiling(true))?;

        let primitive = cache.native_event(handle)?;
        assert_eq!(
            backend.kind_of(primitive),
            Some(EventKind::discard().with_profiling(true))
        );
        Ok(())
    }
}
