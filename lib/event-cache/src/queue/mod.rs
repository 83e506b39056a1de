// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Command queue front-end that draws its completion events from an
//! [`EventCache`].
//!
//! The queue decides when a handle can be retired; the cache decides when
//! the primitive behind it can be reused. Device execution is modelled on
//! the host: a submitted command runs its work item and then signals its
//! event, in submission order.

mod config;

use anyhow::Result;
use parking_lot::Mutex as ParkingMutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace, warn};
use validator::Validate;

use crate::backend::{EventKind, HostEventBackend, NativeEventBackend, Visibility};
use crate::cache::{CacheStats, EventCache};
use crate::guard::EventGuard;
use crate::handle::EventHandle;
use crate::status::EventStatus;

pub use config::{QueueConfig, QueueConfigBuilder, QueueConfigBuilderError, SubmissionMode};

type Work = Box<dyn FnOnce() + Send + 'static>;

struct Command {
    work: Work,
    handle: EventHandle,
    chained: bool,
}

#[derive(Default)]
struct QueueState {
    /// Enqueued but not yet submitted (batched submission only).
    batch: Vec<Command>,
    /// Submitted handles the queue still holds a reference to.
    outstanding: VecDeque<EventHandle>,
    /// Latest discard event of an in-order queue; retired once the next
    /// command has been issued behind it.
    last_discard: Option<EventHandle>,
}

/// A command queue with pooled completion events.
///
/// Work items run while the queue's internal lock is held and must not call
/// back into the same queue.
pub struct CommandQueue {
    config: QueueConfig,
    cache: Arc<EventCache>,
    state: ParkingMutex<QueueState>,
}

impl CommandQueue {
    /// Create a queue backed by a [`HostEventBackend`].
    pub fn new(config: QueueConfig) -> Result<Self> {
        Self::with_backend(config, Arc::new(HostEventBackend::new()))
    }

    /// Create a queue whose events come from `backend`.
    pub fn with_backend(config: QueueConfig, backend: Arc<dyn NativeEventBackend>) -> Result<Self> {
        config.validate()?;
        let cache = EventCache::with_config(backend, config.cache.clone())?;
        trace!(cache = cache.id(), %config, "created command queue");
        Ok(Self {
            config,
            cache,
            state: ParkingMutex::new(QueueState::default()),
        })
    }

    /// The properties this queue was created with.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// The queue's event cache.
    pub fn cache(&self) -> &Arc<EventCache> {
        &self.cache
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Handles the queue still holds a reference to.
    pub fn outstanding(&self) -> usize {
        let state = self.state.lock();
        state.outstanding.len() + state.batch.len() + usize::from(state.last_discard.is_some())
    }

    /// Enqueue `work`, returning a completion event when `want_event` is set.
    ///
    /// Without a requested event the command gets an internal event that
    /// the caller never sees.
    pub fn enqueue<F>(&self, work: F, want_event: bool) -> Result<Option<EventGuard>>
    where
        F: FnOnce() + Send + 'static,
    {
        let visibility = if want_event {
            Visibility::Visible
        } else {
            Visibility::Discard
        };
        let kind = EventKind {
            visibility,
            profiling: self.config.profiling,
        };

        let mut state = self.state.lock();
        if self.config.out_of_order {
            self.retire_completed(&mut state)?;
        }

        // a failure past this point drops `guard`, which releases the
        // caller's reference; the queue's reference is retired by `issue`
        let handle = self.cache.acquire(kind)?;
        let guard = match visibility {
            Visibility::Visible => {
                let guard = self.cache.adopt(handle);
                self.cache.add_ref(handle)?;
                Some(guard)
            }
            Visibility::Discard => None,
        };

        let command = Command {
            work: Box::new(work),
            handle,
            chained: visibility == Visibility::Discard
                && self.config.discard_events
                && !self.config.out_of_order,
        };

        match self.config.submission {
            SubmissionMode::Immediate => self.issue(&mut state, command)?,
            SubmissionMode::Batched { batch_size } => {
                state.batch.push(command);
                if state.batch.len() >= batch_size.get() {
                    self.submit_batch(&mut state)?;
                }
            }
        }

        Ok(guard)
    }

    /// Submit any batched commands.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.submit_batch(&mut state)
    }

    /// Submit everything, wait for it, and retire every handle the queue
    /// holds. Visible events stay alive until their guards are released.
    ///
    /// On error the handles not yet waited on stay with the queue, so a
    /// later `finish` picks up where this one stopped.
    pub fn finish(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.submit_batch(&mut state)?;

        if let Some(last) = state.last_discard.take() {
            state.outstanding.push_back(last);
        }
        while let Some(&handle) = state.outstanding.front() {
            self.cache.wait(handle, None)?;
            state.outstanding.pop_front();
            self.cache.retire(handle)?;
        }
        Ok(())
    }

    /// Wait for the given events, then retire whatever the queue holds that
    /// has completed.
    pub fn wait(&self, events: &[EventGuard]) -> Result<()> {
        let mut state = self.state.lock();
        self.submit_batch(&mut state)?;

        let handles: Vec<EventHandle> = events.iter().map(EventGuard::handle).collect();
        self.cache.wait_all(&handles, None)?;
        self.retire_completed(&mut state)
    }

    // ── Internal helpers ──────────────────────────────────────────────

    /// Issue pending commands in order. Commands behind a failed one stay
    /// queued for the next submission.
    fn submit_batch(&self, state: &mut QueueState) -> Result<()> {
        let mut batch = std::mem::take(&mut state.batch).into_iter();
        if batch.len() > 0 {
            trace!(commands = batch.len(), "submitting batch");
        }
        while let Some(command) = batch.next() {
            if let Err(err) = self.issue(state, command) {
                state.batch.extend(batch);
                return Err(err);
            }
        }
        Ok(())
    }

    fn issue(&self, state: &mut QueueState, command: Command) -> Result<()> {
        let Command {
            work,
            handle,
            chained,
        } = command;

        work();
        if let Err(err) = self.cache.signal(handle) {
            // the work already ran; nothing will ever signal this event
            warn!(%handle, %err, "failed to signal completion, dropping queue reference");
            if let Err(retire_err) = self.cache.retire(handle) {
                debug!(%handle, err = %retire_err, "failed to retire unsignaled event");
            }
            return Err(err);
        }

        // in order: the previous discard event is behind this command now
        let previous = if self.config.out_of_order {
            None
        } else {
            state.last_discard.take()
        };

        if chained {
            state.last_discard = Some(handle);
        } else {
            state.outstanding.push_back(handle);
        }

        if let Some(previous) = previous {
            self.cache.retire(previous)?;
        }
        Ok(())
    }

    fn retire_completed(&self, state: &mut QueueState) -> Result<()> {
        let mut remaining = VecDeque::with_capacity(state.outstanding.len());
        let mut result = Ok(());

        for handle in state.outstanding.drain(..) {
            if result.is_err() {
                remaining.push_back(handle);
                continue;
            }
            match self.cache.status(handle) {
                Ok(EventStatus::Complete) => {
                    if let Err(err) = self.cache.retire(handle) {
                        result = Err(err);
                    }
                }
                Ok(EventStatus::Pending) => remaining.push_back(handle),
                Err(err) => {
                    remaining.push_back(handle);
                    result = Err(err);
                }
            }
        }

        state.outstanding = remaining;
        result
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            warn!(cache = self.cache.id(), %err, "failed to finish queue before teardown");
        }
        self.cache.teardown();
    }
}
