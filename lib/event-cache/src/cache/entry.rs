// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use parking_lot::Mutex as ParkingMutex;
use std::fmt::{self, Display, Formatter};

use crate::backend::{EventKind, NativeEvent};
use crate::handle::EventHandle;
use crate::status::Generation;

const MAX_GENERATION: Generation = Generation::MAX;

/// Arena slot of a cache entry. Stable for the life of the entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct EntryKey(u32);

impl EntryKey {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    pub(crate) fn from_handle(handle: EventHandle) -> Self {
        Self(handle.entry_index())
    }

    pub(crate) fn handle(&self, cache_id: u64, generation: Generation) -> EventHandle {
        EventHandle::new(cache_id, self.0, generation)
    }
}

impl Display for EntryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "entry#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EntryError {
    InUse {
        key: EntryKey,
        generation: Generation,
        refcount: u32,
    },
    GenerationOverflow {
        key: EntryKey,
    },
    StaleGeneration {
        key: EntryKey,
        requested: Generation,
        current: Generation,
    },
    Released {
        key: EntryKey,
        generation: Generation,
    },
    AlreadyRetired {
        key: EntryKey,
        generation: Generation,
    },
    RefcountOverflow {
        key: EntryKey,
        generation: Generation,
    },
    Destroyed {
        key: EntryKey,
    },
}

impl Display for EntryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InUse {
                key,
                generation,
                refcount,
            } => write!(
                f,
                "{} generation {} still referenced ({} refs)",
                key, generation, refcount
            ),
            Self::GenerationOverflow { key } => {
                write!(f, "{} exhausted its generation space", key)
            }
            Self::StaleGeneration {
                key,
                requested,
                current,
            } => write!(
                f,
                "Stale generation {} for {}; current generation {}",
                requested, key, current
            ),
            Self::Released { key, generation } => write!(
                f,
                "{} generation {} was already released",
                key, generation
            ),
            Self::AlreadyRetired { key, generation } => write!(
                f,
                "{} generation {} was already retired by its queue",
                key, generation
            ),
            Self::RefcountOverflow { key, generation } => write!(
                f,
                "{} generation {} reference count overflow",
                key, generation
            ),
            Self::Destroyed { key } => write!(f, "{} was destroyed", key),
        }
    }
}

impl std::error::Error for EntryError {}

pub(crate) type EntryResult<T> = std::result::Result<T, EntryError>;

/// Result of dropping one reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Released {
    /// Other holders remain.
    Retained(u32),
    /// Last reference dropped; the entry may be recycled.
    Idle,
}

/// One pooled native primitive, reused across generations.
///
/// The entry is in use while its reference count is non-zero. Only the
/// release that drops the count to zero may hand the entry back to a free
/// list, and only [`begin_generation`](Self::begin_generation) may take it
/// out again, so an entry appears on at most one free list at a time.
pub(crate) struct CacheEntry {
    key: EntryKey,
    kind: EventKind,
    state: ParkingMutex<EntryState>,
}

#[derive(Debug)]
struct EntryState {
    primitive: Option<NativeEvent>,
    generation: Generation,
    refcount: u32,
    queue_retired: bool,
}

impl CacheEntry {
    pub(crate) fn new(key: EntryKey, kind: EventKind, primitive: NativeEvent) -> Self {
        Self {
            key,
            kind,
            state: ParkingMutex::new(EntryState {
                primitive: Some(primitive),
                generation: 0,
                refcount: 0,
                queue_retired: false,
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_generation(
        key: EntryKey,
        kind: EventKind,
        primitive: NativeEvent,
        generation: Generation,
    ) -> Self {
        let entry = Self::new(key, kind, primitive);
        entry.state.lock().generation = generation;
        entry
    }

    pub(crate) fn key(&self) -> EntryKey {
        self.key
    }

    pub(crate) fn kind(&self) -> EventKind {
        self.kind
    }

    /// Primitive of an idle entry, for resetting it before reuse.
    pub(crate) fn idle_primitive(&self) -> EntryResult<NativeEvent> {
        let state = self.state.lock();
        if state.refcount > 0 {
            return Err(EntryError::InUse {
                key: self.key,
                generation: state.generation,
                refcount: state.refcount,
            });
        }
        state
            .primitive
            .ok_or(EntryError::Destroyed { key: self.key })
    }

    /// Start a new generation with a single reference.
    pub(crate) fn begin_generation(&self) -> EntryResult<Generation> {
        let mut state = self.state.lock();
        if state.primitive.is_none() {
            return Err(EntryError::Destroyed { key: self.key });
        }
        if state.refcount > 0 {
            return Err(EntryError::InUse {
                key: self.key,
                generation: state.generation,
                refcount: state.refcount,
            });
        }
        if state.generation == MAX_GENERATION {
            return Err(EntryError::GenerationOverflow { key: self.key });
        }
        state.generation += 1;
        state.refcount = 1;
        state.queue_retired = false;
        Ok(state.generation)
    }

    pub(crate) fn add_ref(&self, generation: Generation) -> EntryResult<u32> {
        let mut state = self.state.lock();
        self.check_live(&state, generation)?;
        state.refcount = state
            .refcount
            .checked_add(1)
            .ok_or(EntryError::RefcountOverflow {
                key: self.key,
                generation,
            })?;
        Ok(state.refcount)
    }

    pub(crate) fn release(&self, generation: Generation) -> EntryResult<Released> {
        let mut state = self.state.lock();
        self.check_live(&state, generation)?;
        Ok(Self::drop_reference(&mut state))
    }

    /// Drop the reference held by the queue. Allowed once per generation.
    pub(crate) fn retire(&self, generation: Generation) -> EntryResult<Released> {
        let mut state = self.state.lock();
        self.check_live(&state, generation)?;
        if state.queue_retired {
            return Err(EntryError::AlreadyRetired {
                key: self.key,
                generation,
            });
        }
        state.queue_retired = true;
        Ok(Self::drop_reference(&mut state))
    }

    /// Primitive backing a live generation.
    pub(crate) fn primitive_for(&self, generation: Generation) -> EntryResult<NativeEvent> {
        let state = self.state.lock();
        self.check_live(&state, generation)?;
        state
            .primitive
            .ok_or(EntryError::Destroyed { key: self.key })
    }

    pub(crate) fn refcount_for(&self, generation: Generation) -> EntryResult<u32> {
        let state = self.state.lock();
        self.check_live(&state, generation)?;
        Ok(state.refcount)
    }

    pub(crate) fn is_in_use(&self) -> bool {
        self.state.lock().refcount > 0
    }

    /// Take the primitive out for destruction. Returns `None` once taken.
    pub(crate) fn take_primitive(&self) -> Option<NativeEvent> {
        self.state.lock().primitive.take()
    }

    fn drop_reference(state: &mut EntryState) -> Released {
        state.refcount -= 1;
        if state.refcount == 0 {
            Released::Idle
        } else {
            Released::Retained(state.refcount)
        }
    }

    fn check_live(&self, state: &EntryState, generation: Generation) -> EntryResult<()> {
        if state.primitive.is_none() {
            return Err(EntryError::Destroyed { key: self.key });
        }
        if generation != state.generation {
            return Err(EntryError::StaleGeneration {
                key: self.key,
                requested: generation,
                current: state.generation,
            });
        }
        if state.refcount == 0 {
            return Err(EntryError::Released {
                key: self.key,
                generation,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(index: u32) -> CacheEntry {
        CacheEntry::new(
            EntryKey::new(index),
            EventKind::discard(),
            NativeEvent::from_raw(index as u64 + 100),
        )
    }

    #[test]
    fn begin_generation_starts_with_one_reference() {
        let entry = make_entry(0);
        let generation = entry.begin_generation().unwrap();
        assert_eq!(generation, 1);
        assert_eq!(entry.refcount_for(generation).unwrap(), 1);
        assert!(entry.is_in_use());
    }

    #[test]
    fn begin_generation_rejects_in_use_entry() {
        let entry = make_entry(1);
        entry.begin_generation().unwrap();
        let err = entry.begin_generation().unwrap_err();
        assert!(matches!(err, EntryError::InUse { refcount: 1, .. }));
        assert!(err.to_string().contains("still referenced"));
    }

    #[test]
    fn release_to_zero_goes_idle() {
        let entry = make_entry(2);
        let generation = entry.begin_generation().unwrap();
        assert_eq!(entry.add_ref(generation).unwrap(), 2);
        assert_eq!(entry.release(generation).unwrap(), Released::Retained(1));
        assert_eq!(entry.release(generation).unwrap(), Released::Idle);
        assert!(!entry.is_in_use());
    }

    #[test]
    fn double_release_is_rejected() {
        let entry = make_entry(3);
        let generation = entry.begin_generation().unwrap();
        entry.release(generation).unwrap();

        let err = entry.release(generation).unwrap_err();
        assert_eq!(
            err,
            EntryError::Released {
                key: EntryKey::new(3),
                generation
            }
        );
        assert!(entry.add_ref(generation).is_err());
        assert!(entry.primitive_for(generation).is_err());
    }

    #[test]
    fn stale_generation_cannot_touch_next_generation() {
        let entry = make_entry(4);
        let first = entry.begin_generation().unwrap();
        entry.release(first).unwrap();
        let second = entry.begin_generation().unwrap();

        let err = entry.release(first).unwrap_err();
        assert!(matches!(
            err,
            EntryError::StaleGeneration {
                requested: 1,
                current: 2,
                ..
            }
        ));
        assert_eq!(entry.refcount_for(second).unwrap(), 1);
    }

    #[test]
    fn retire_only_once_per_generation() {
        let entry = make_entry(5);
        let generation = entry.begin_generation().unwrap();
        entry.add_ref(generation).unwrap();

        assert_eq!(entry.retire(generation).unwrap(), Released::Retained(1));
        let err = entry.retire(generation).unwrap_err();
        assert!(err.to_string().contains("already retired"));

        assert_eq!(entry.release(generation).unwrap(), Released::Idle);
    }

    #[test]
    fn retire_flag_clears_on_new_generation() {
        let entry = make_entry(6);
        let generation = entry.begin_generation().unwrap();
        assert_eq!(entry.retire(generation).unwrap(), Released::Idle);

        let next = entry.begin_generation().unwrap();
        assert_eq!(entry.retire(next).unwrap(), Released::Idle);
    }

    #[test]
    fn idle_primitive_requires_idle_entry() {
        let entry = make_entry(7);
        assert_eq!(entry.idle_primitive().unwrap(), NativeEvent::from_raw(107));
        let generation = entry.begin_generation().unwrap();
        assert!(entry.idle_primitive().is_err());
        assert_eq!(
            entry.primitive_for(generation).unwrap(),
            NativeEvent::from_raw(107)
        );
    }

    #[test]
    fn take_primitive_destroys_entry_once() {
        let entry = make_entry(8);
        let generation = entry.begin_generation().unwrap();

        assert_eq!(entry.take_primitive(), Some(NativeEvent::from_raw(108)));
        assert_eq!(entry.take_primitive(), None);

        let err = entry.release(generation).unwrap_err();
        assert_eq!(
            err,
            EntryError::Destroyed {
                key: EntryKey::new(8)
            }
        );
        assert!(entry.begin_generation().is_err());
    }

    #[test]
    fn generation_overflow_is_reported() {
        let entry = CacheEntry::with_generation(
            EntryKey::new(9),
            EventKind::discard(),
            NativeEvent::from_raw(1),
            MAX_GENERATION,
        );
        let err = entry.begin_generation().unwrap_err();
        assert_eq!(
            err,
            EntryError::GenerationOverflow {
                key: EntryKey::new(9)
            }
        );
    }

    #[test]
    fn key_display() {
        assert_eq!(EntryKey::new(42).to_string(), "entry#42");
    }
}
