// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Event cache configuration.

use anyhow::Result;
use derive_builder::Builder;
use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Environment prefix read by [`EventCacheConfig::from_env`].
pub const ENV_PREFIX: &str = "DYN_EVENT_CACHE_";

/// Order in which idle entries are handed out again.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReusePolicy {
    /// Oldest idle entry first. Leaves the device the most time to finish
    /// its own bookkeeping on a primitive before it is reset.
    #[default]
    Fifo,
    /// Most recently released entry first.
    Lifo,
}

/// Configuration for an [`EventCache`](crate::EventCache).
#[derive(Debug, Clone, Builder, Validate, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventCacheConfig {
    /// Upper bound on live native primitives across all kinds.
    ///
    /// A cache miss beyond this bound fails with `ResourceExhausted`.
    #[validate(range(min = 1))]
    #[builder(default = "None", setter(strip_option))]
    #[serde(default)]
    pub max_events: Option<usize>,

    /// Reuse order for idle entries.
    #[builder(default)]
    #[serde(default)]
    pub reuse_policy: ReusePolicy,
}

impl EventCacheConfig {
    /// Builder for EventCacheConfig
    pub fn builder() -> EventCacheConfigBuilder {
        EventCacheConfigBuilder::default()
    }

    /// Figment seeded with the defaults and the `DYN_EVENT_CACHE_*` variables.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load and validate the configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for EventCacheConfig {
    fn default() -> Self {
        Self {
            max_events: None,
            reuse_policy: ReusePolicy::Fifo,
        }
    }
}
