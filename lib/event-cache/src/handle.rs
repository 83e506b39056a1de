// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Generational event handle encoded in a single `u128` value.

use std::fmt::{self, Display, Formatter};

use crate::status::Generation;

/// Identifies one use of a cached native event.
///
/// The cache id occupies the high 64 bits, the entry index the next 32 and
/// the generation the low 32, so every field is a plain truncating cast.
///
/// The handle itself carries no ownership. Reference counts live in the
/// owning [`EventCache`](crate::EventCache) entry and are checked against the
/// generation, so a handle that outlived its generation is rejected instead
/// of touching a primitive that has since been handed to someone else.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventHandle(u128);

impl EventHandle {
    pub(crate) fn new(cache_id: u64, entry_index: u32, generation: Generation) -> Self {
        let low = (u64::from(entry_index) << 32) | u64::from(generation);
        Self((u128::from(cache_id) << 64) | u128::from(low))
    }

    /// Id of the cache (and therefore the queue) this handle belongs to.
    pub fn cache_id(&self) -> u64 {
        (self.0 >> 64) as u64
    }

    /// Index of the backing cache entry.
    pub fn entry_index(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Generation of the backing cache entry this handle refers to.
    pub fn generation(&self) -> Generation {
        self.0 as Generation
    }

    #[cfg(test)]
    pub(crate) fn with_generation(&self, generation: Generation) -> Self {
        Self::new(self.cache_id(), self.entry_index(), generation)
    }
}

impl Display for EventHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EventHandle(cache={}, index={}, generation={})",
            self.cache_id(),
            self.entry_index(),
            self.generation()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_round_trip_through_layout() {
        let handle = EventHandle::new(0xdead_beef, 7, 42);
        assert_eq!(handle.cache_id(), 0xdead_beef);
        assert_eq!(handle.entry_index(), 7);
        assert_eq!(handle.generation(), 42);
    }

    #[test]
    fn extreme_values_do_not_bleed_into_neighbours() {
        let handle = EventHandle::new(u64::MAX, 0, Generation::MAX);
        assert_eq!(handle.cache_id(), u64::MAX);
        assert_eq!(handle.entry_index(), 0);
        assert_eq!(handle.generation(), Generation::MAX);

        let handle = EventHandle::new(0, u32::MAX, 0);
        assert_eq!(handle.cache_id(), 0);
        assert_eq!(handle.entry_index(), u32::MAX);
        assert_eq!(handle.generation(), 0);
    }

    #[test]
    fn with_generation_keeps_identity() {
        let handle = EventHandle::new(3, 9, 1);
        let next = handle.with_generation(2);
        assert_eq!(next.cache_id(), 3);
        assert_eq!(next.entry_index(), 9);
        assert_eq!(next.generation(), 2);
        assert_ne!(handle, next);
    }

    #[test]
    fn display_names_every_field() {
        let display = EventHandle::new(1, 2, 3).to_string();
        assert!(display.contains("EventHandle"));
        assert!(display.contains("cache=1"));
        assert!(display.contains("index=2"));
        assert!(display.contains("generation=3"));
    }
}
