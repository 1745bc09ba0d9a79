//! Error taxonomy for portal operations.
//!
//! Only [`PortalError::Transport`] is retryable, and only by restarting the
//! whole sequence from the locator. [`PortalError::WrongContext`] is retried
//! once inside the calendar extractor before it reaches callers.

use std::fmt;

use crate::models::{DayMismatch, ServicePeriod};

/// What the locator failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Provider,
    Invoice,
    Consumer,
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Provider => f.write_str("provider"),
            Lookup::Invoice => f.write_str("invoice"),
            Lookup::Consumer => f.write_str("consumer line"),
        }
    }
}

/// Why a requested day cannot be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    /// The cell is rendered but greyed out.
    Disabled,
    /// No cell exists for the day (outside the service month or period).
    Absent,
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unavailable::Disabled => f.write_str("disabled"),
            Unavailable::Absent => f.write_str("not on the calendar"),
        }
    }
}

/// What a rendered calendar showed instead of the requested line and month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedContext {
    Period {
        expected: ServicePeriod,
        observed: ServicePeriod,
    },
    Line {
        observed: String,
    },
}

impl fmt::Display for RenderedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderedContext::Period { expected, observed } => {
                write!(f, "month {observed}, expected {expected}")
            }
            RenderedContext::Line { observed } => write!(f, "line {observed}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("{what} not found: {detail}")]
    NotFound { what: Lookup, detail: String },

    #[error("calendar for line {line_id} rendered {rendered}")]
    WrongContext {
        line_id: String,
        rendered: RenderedContext,
    },

    #[error("calendar for line {line_id} does not declare `{name}`")]
    MissingConstant { line_id: String, name: String },

    #[error("day {day} on line {line_id} is {reason}")]
    DayUnavailable {
        line_id: String,
        day: u8,
        reason: Unavailable,
    },

    #[error("line {line_id} did not persist: {}", join_mismatches(.mismatches))]
    PersistenceMismatch {
        line_id: String,
        mismatches: Vec<DayMismatch>,
    },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("portal session expired ({url})")]
    AuthExpired { url: String },

    #[error("unexpected page from {url}: {detail}")]
    UnexpectedPage { url: String, detail: String },

    #[error("invalid submission request: {0}")]
    InvalidRequest(String),
}

fn join_mismatches(mismatches: &[DayMismatch]) -> String {
    mismatches
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl PortalError {
    pub fn not_found(what: Lookup, detail: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            detail: detail.into(),
        }
    }

    pub fn unexpected_page(url: impl fmt::Display, detail: impl Into<String>) -> Self {
        Self::UnexpectedPage {
            url: url.to_string(),
            detail: detail.into(),
        }
    }

    /// Whether restarting the sequence from the locator may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Stable short name of the variant, for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::WrongContext { .. } => "wrong_context",
            Self::MissingConstant { .. } => "missing_constant",
            Self::DayUnavailable { .. } => "day_unavailable",
            Self::PersistenceMismatch { .. } => "persistence_mismatch",
            Self::Transport { .. } => "transport",
            Self::AuthExpired { .. } => "auth_expired",
            Self::UnexpectedPage { .. } => "unexpected_page",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Map a reqwest failure. Status errors are raised separately by the
    /// client, so everything here is a transport problem.
    pub(crate) fn transport(url: impl fmt::Display, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "timed out".to_string()
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            err.to_string()
        };
        Self::Transport {
            url: url.to_string(),
            message,
        }
    }
}
