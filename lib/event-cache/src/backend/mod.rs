// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The native event primitive, abstracted behind [`NativeEventBackend`].
//!
//! Creation and destruction are the expensive calls the cache exists to
//! avoid; reset, signal, query and wait are cheap. Wrapping a backend in a
//! [`CountingBackend`] makes every call observable without global state.

mod counting;
mod host;

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use counting::{CallCounter, CountingBackend};
pub use host::HostEventBackend;

/// Opaque id of a native completion primitive.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeEvent(u64);

impl NativeEvent {
    /// Wrap a backend-specific raw id.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Return the backend-specific raw id.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Display for NativeEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "NativeEvent({:#x})", self.0)
    }
}

/// Whether a completion object is exposed to the caller of an enqueue.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Internal only; recycled as soon as the queue retires it.
    #[default]
    Discard,
    /// Returned to the caller, who keeps it alive until released.
    Visible,
}

/// Properties a native primitive is created with.
///
/// Primitives of different kinds are never interchanged: visible events must
/// be host-observable and profiling events carry timestamp storage.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKind {
    /// Visibility of handles backed by this primitive.
    pub visibility: Visibility,
    /// Whether the primitive records profiling timestamps.
    pub profiling: bool,
}

impl EventKind {
    /// Kind used for internal, never-returned completion events.
    pub fn discard() -> Self {
        Self {
            visibility: Visibility::Discard,
            profiling: false,
        }
    }

    /// Kind used for events handed to the caller.
    pub fn visible() -> Self {
        Self {
            visibility: Visibility::Visible,
            profiling: false,
        }
    }

    /// Return a copy with profiling toggled.
    pub fn with_profiling(mut self, profiling: bool) -> Self {
        self.profiling = profiling;
        self
    }

    /// Returns `true` when the host must be able to observe the primitive.
    pub fn is_host_visible(&self) -> bool {
        self.visibility == Visibility::Visible
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let visibility = match self.visibility {
            Visibility::Discard => "discard",
            Visibility::Visible => "visible",
        };
        if self.profiling {
            write!(f, "{}+profiling", visibility)
        } else {
            f.write_str(visibility)
        }
    }
}

/// Failures reported by a native backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend refuses to create more primitives.
    #[error("native event limit reached ({limit} live events)")]
    OutOfResources {
        /// Maximum number of live primitives.
        limit: usize,
    },

    /// The primitive does not exist (never created, or already destroyed).
    #[error("unknown native event {0}")]
    UnknownEvent(NativeEvent),

    /// A native call failed for a backend-specific reason.
    #[error("native call {call} failed: {reason}")]
    CallFailed {
        /// Name of the failing call.
        call: &'static str,
        /// Backend message.
        reason: String,
    },
}

/// Creation, reuse and observation of native completion primitives.
///
/// Implementations must be thread-safe; the cache calls into them from every
/// thread that drives the owning queue.
pub trait NativeEventBackend: Send + Sync {
    /// Create a new unsignaled primitive. Expensive.
    fn create(&self, kind: EventKind) -> Result<NativeEvent, BackendError>;

    /// Destroy a primitive. Expensive.
    fn destroy(&self, event: NativeEvent) -> Result<(), BackendError>;

    /// Return a retired primitive to the unsignaled state. Cheap.
    fn reset(&self, event: NativeEvent) -> Result<(), BackendError>;

    /// Signal completion from the host side.
    fn signal(&self, event: NativeEvent) -> Result<(), BackendError>;

    /// Non-blocking check of the signaled state.
    fn query(&self, event: NativeEvent) -> Result<bool, BackendError>;

    /// Block until signaled, or until `timeout` elapses.
    ///
    /// Returns `Ok(false)` on time-out. `None` waits without limit.
    fn wait(&self, event: NativeEvent, timeout: Option<Duration>) -> Result<bool, BackendError>;
}
