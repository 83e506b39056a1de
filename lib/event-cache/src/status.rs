// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Status types reported by handle queries and waits.

/// Alias for cache entry generation counters.
pub type Generation = u32;

/// Status returned from non-blocking event queries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum EventStatus {
    Pending,
    Complete,
}

/// Outcome of a blocking wait.
///
/// A time-out is not an error: the handle is left untouched and still holds
/// its references, so the caller may wait again or give up and release it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WaitStatus {
    /// The native primitive was observed signaled.
    Completed,
    /// The wait budget elapsed before the primitive was signaled.
    TimedOut,
}

impl WaitStatus {
    /// Returns `true` when the wait observed completion.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub(crate) fn from_signaled(signaled: bool) -> Self {
        if signaled {
            Self::Completed
        } else {
            Self::TimedOut
        }
    }
}
