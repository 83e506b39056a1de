// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Logging setup for binaries and tests embedding the event cache.
//!
//! Filters come from the `DYN_LOG` environment variable using the usual
//! `EnvFilter` syntax, e.g. `DYN_LOG=dynamo_event_cache=trace`. The default
//! level is `info`.

use std::sync::Once;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// ENV used to set the log level
const FILTER_ENV: &str = "DYN_LOG";

/// Once instance to ensure the logger is only initialized once
static INIT: Once = Once::new();

/// Initialize the logger
///
/// Safe to call more than once. If another global subscriber is already
/// installed the call leaves it in place.
pub fn init() {
    INIT.call_once(setup_logging);
}

fn setup_logging() {
    let l = fmt::layer()
        .event_format(fmt::format().compact())
        .with_writer(std::io::stderr)
        .with_filter(filters());
    let _ = tracing_subscriber::registry().with(l).try_init();
}

fn filters() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var(FILTER_ENV)
        .from_env_lossy()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
        tracing::info!("logging initialized twice");
    }
}
