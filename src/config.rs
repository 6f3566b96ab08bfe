// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;

/// Client configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Optional cap on conflict retries per update. When unset, updates retry
    /// until the server stops reporting conflicts, which is the documented
    /// contract for optimistic-concurrency callers.
    pub conflict_retry_limit: Option<u32>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let conflict_retry_limit = match env::var("CONFLICT_RETRY_LIMIT") {
            Ok(raw) => Some(
                raw.parse()
                    .context("CONFLICT_RETRY_LIMIT must be an unsigned integer")?,
            ),
            Err(_) => None,
        };

        Ok(Config {
            conflict_retry_limit,
        })
    }
}
