// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for reconciliation and cloud API calls.
//!
//! Every failure is reduced to one of four classes. The class decides whether
//! the controller retries on its own and which reason is written on the Ingress:
//!
//! | Class | Retried | Typical cause |
//! |-------|---------|---------------|
//! | `NotFound` | no (terminal success on delete) | object or load balancer absent |
//! | `Transient` | yes, with backoff | timeout, 429, 5xx, connection reset |
//! | `Conflict` | no | immutable attribute change, `FAILED` load balancer, 409 |
//! | `Malformed` | no, until the Ingress changes | missing TLS secret, 400 |

use crate::status_reasons::{
    REASON_INVALID_INGRESS, REASON_LOAD_BALANCER_CONFLICT, REASON_NOT_FOUND,
    REASON_TRANSIENT_FAILURE,
};
use std::time::Duration;
use thiserror::Error;

/// Failure class driving retry and reporting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    NotFound,
    Transient,
    Conflict,
    Malformed,
}

impl ErrorClass {
    /// Label value for metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Transient => "transient",
            Self::Conflict => "conflict",
            Self::Malformed => "malformed",
        }
    }
}

/// Classified failure of one reconcile cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("malformed input: {0}")]
    Malformed(String),
}

impl ReconcileError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Transient(_) => ErrorClass::Transient,
            Self::Conflict(_) => ErrorClass::Conflict,
            Self::Malformed(_) => ErrorClass::Malformed,
        }
    }

    /// Condition reason written to the Ingress for this failure.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound(_) => REASON_NOT_FOUND,
            Self::Transient(_) => REASON_TRANSIENT_FAILURE,
            Self::Conflict(_) => REASON_LOAD_BALANCER_CONFLICT,
            Self::Malformed(_) => REASON_INVALID_INGRESS,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classify a Kubernetes API error.
    ///
    /// 429, 5xx and service (connection) errors are transient; 404 is `NotFound`;
    /// 409 is `Conflict`; any other API rejection is `Malformed`.
    #[must_use]
    pub fn from_kube(err: &kube::Error, what: &str) -> Self {
        match err {
            kube::Error::Api(resp) => match classify_http_status(resp.code) {
                ErrorClass::NotFound => Self::NotFound(what.to_string()),
                ErrorClass::Transient => Self::Transient(format!("{what}: {}", resp.message)),
                ErrorClass::Conflict => Self::Conflict(format!("{what}: {}", resp.message)),
                ErrorClass::Malformed => Self::Malformed(format!("{what}: {}", resp.message)),
            },
            kube::Error::Service(e) => Self::Transient(format!("{what}: {e}")),
            other => Self::Transient(format!("{what}: {other}")),
        }
    }
}

/// Failure of a single call to the cloud load balancer API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The provider answered with a non-success status
    #[error("OCI API returned HTTP {status} ({code}): {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },

    /// The per-call deadline expired; the call may still have been applied
    #[error("OCI API call '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Connection-level failure before a response was received
    #[error("OCI API transport error: {0}")]
    Transport(String),

    /// The response body did not have the expected shape
    #[error("failed to decode OCI API response: {0}")]
    Decode(String),
}

impl ApiError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Status { status, .. } => classify_http_status(*status),
            Self::Timeout { .. } | Self::Transport(_) => ErrorClass::Transient,
            Self::Decode(_) => ErrorClass::Malformed,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<ApiError> for ReconcileError {
    fn from(err: ApiError) -> Self {
        match err.class() {
            ErrorClass::NotFound => Self::NotFound(err.to_string()),
            ErrorClass::Transient => Self::Transient(err.to_string()),
            ErrorClass::Conflict => Self::Conflict(err.to_string()),
            ErrorClass::Malformed => Self::Malformed(err.to_string()),
        }
    }
}

/// Map an HTTP status code from either API to an error class.
///
/// | HTTP Code | Class |
/// |-----------|-------|
/// | 404 | `NotFound` |
/// | 408, 429, 5xx | `Transient` |
/// | 401, 403, 409, 412 | `Conflict` (needs an operator) |
/// | other 4xx | `Malformed` |
/// | anything else | `Transient` |
#[must_use]
pub fn classify_http_status(status: u16) -> ErrorClass {
    match status {
        404 => ErrorClass::NotFound,
        408 | 429 | 500..=599 => ErrorClass::Transient,
        401 | 403 | 409 | 412 => ErrorClass::Conflict,
        400..=499 => ErrorClass::Malformed,
        _ => ErrorClass::Transient,
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
