// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DroverError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("gave up updating {kind} '{name}' after {limit} conflict retries")]
    RetryBudgetExhausted {
        kind: &'static str,
        name: String,
        limit: u32,
    },

    #[error("{context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: kube::Error,
    },
}

impl DroverError {
    pub fn backend(context: impl Into<String>, source: kube::Error) -> Self {
        DroverError::Backend {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DroverError>;

/// The API server reported the object absent (HTTP 404).
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 404)
}

/// The API server rejected a create because the object is already there.
/// Shares HTTP 409 with conflicts, so the status reason disambiguates.
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 409 && e.reason == "AlreadyExists")
}

/// The API server rejected an update because the submitted resourceVersion is stale.
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 409 && e.reason == "Conflict")
}
