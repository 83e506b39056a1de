// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::num::NonZeroUsize;
use validator::Validate;

use crate::config::EventCacheConfig;

/// When enqueued work is handed to the device.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    /// Every command executes as it is enqueued.
    #[default]
    Immediate,
    /// Commands accumulate until `batch_size` are pending or the queue is
    /// flushed.
    Batched {
        /// Pending commands that trigger a submission.
        batch_size: NonZeroUsize,
    },
}

impl SubmissionMode {
    /// Batched submission with the given threshold.
    pub fn batched(batch_size: NonZeroUsize) -> Self {
        Self::Batched { batch_size }
    }
}

/// Queue properties, mirroring the flags a queue is created with.
#[derive(Debug, Clone, Default, Builder, Validate, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueConfig {
    /// Commands enqueued without a requested event get internal events that
    /// are recycled as soon as the queue retires them.
    #[builder(default)]
    #[serde(default)]
    pub discard_events: bool,

    /// Commands may execute in any order; completion must be observed
    /// before an internal event is recycled.
    #[builder(default)]
    #[serde(default)]
    pub out_of_order: bool,

    /// Submission policy.
    #[builder(default)]
    #[serde(default)]
    pub submission: SubmissionMode,

    /// Events carry profiling timestamps.
    #[builder(default)]
    #[serde(default)]
    pub profiling: bool,

    /// Configuration of the queue's event cache.
    #[builder(default)]
    #[serde(default)]
    #[validate(nested)]
    pub cache: EventCacheConfig,
}

impl QueueConfig {
    /// Builder for QueueConfig
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::default()
    }
}

impl Display for QueueConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();
        if self.discard_events {
            flags.push("DISCARD_EVENTS".to_string());
        }
        if self.out_of_order {
            flags.push("OUT_OF_ORDER_EXEC_MODE_ENABLE".to_string());
        }
        match self.submission {
            SubmissionMode::Immediate => flags.push("SUBMISSION_IMMEDIATE".to_string()),
            SubmissionMode::Batched { batch_size } => {
                flags.push(format!("SUBMISSION_BATCHED({})", batch_size))
            }
        }
        if self.profiling {
            flags.push("PROFILING_ENABLE".to_string());
        }
        f.write_str(&flags.join("|"))
    }
}
