// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy surfaced by the cache and its handles.

use crate::backend::{BackendError, EventKind};
use crate::handle::EventHandle;

/// Errors returned by [`EventCache`](crate::EventCache) operations.
///
/// Public functions return `anyhow::Result`; downcast to this type to branch
/// on the variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventCacheError {
    /// A cache miss could not produce a new native primitive.
    ///
    /// Not retried internally: nothing has been freed since the failure.
    #[error("cannot create native event of kind {kind}: {reason}")]
    ResourceExhausted {
        /// Kind of primitive that was requested.
        kind: EventKind,
        /// Backend or capacity message.
        reason: String,
    },

    /// The caller broke the handle lifetime contract, e.g. released a handle
    /// whose reference count was already zero or waited on a retired handle.
    #[error("invalid use of {handle}: {reason}")]
    InvalidState {
        /// Offending handle.
        handle: EventHandle,
        /// What was wrong with it.
        reason: String,
    },

    /// The cache was torn down together with its queue.
    #[error("event cache has been torn down")]
    Shutdown,

    /// Any other failure reported by the native backend.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl EventCacheError {
    /// Returns `true` for [`EventCacheError::InvalidState`].
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    /// Returns `true` for [`EventCacheError::ResourceExhausted`].
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }
}
