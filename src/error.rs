//! Unified error handling for the trip-engine library.
//!
//! This module provides a consistent error type for all trip operations,
//! replacing mixed error handling patterns (Option, panic, silent failures).

use std::fmt;

/// Unified error type for trip-engine operations.
#[derive(Debug, Clone)]
pub enum TripError {
    /// Classification lookup failed (callers fall back to the sync heuristic)
    Classification { message: String },
    /// Backend list API mutation failed (transient, retryable)
    Backend {
        message: String,
        status_code: Option<u16>,
    },
    /// Session store read/write error
    Persistence { message: String },
    /// Operation is not valid in the current trip phase
    InvalidTransition { from: String, action: String },
    /// Item cannot be migrated because no later store segment exists
    NoNextStore { item_id: Option<i64> },
    /// Item id is not part of the current route
    UnknownItem { item_id: i64 },
}

impl TripError {
    pub fn classification(message: impl Into<String>) -> Self {
        TripError::Classification {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>, status_code: Option<u16>) -> Self {
        TripError::Backend {
            message: message.into(),
            status_code,
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        TripError::Persistence {
            message: message.into(),
        }
    }

    pub fn invalid_transition(from: impl Into<String>, action: impl Into<String>) -> Self {
        TripError::InvalidTransition {
            from: from.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for TripError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripError::Classification { message } => {
                write!(f, "Classification failed: {}", message)
            }
            TripError::Backend {
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "Backend error ({}): {}", code, message)
                } else {
                    write!(f, "Backend error: {}", message)
                }
            }
            TripError::Persistence { message } => {
                write!(f, "Session store error: {}", message)
            }
            TripError::InvalidTransition { from, action } => {
                write!(f, "Cannot {} while in the {} phase", action, from)
            }
            TripError::NoNextStore { item_id } => {
                if let Some(id) = item_id {
                    write!(f, "Item {} cannot move: no later store in this plan", id)
                } else {
                    write!(f, "No later store in this plan")
                }
            }
            TripError::UnknownItem { item_id } => {
                write!(f, "Item {} is not part of the current route", item_id)
            }
        }
    }
}

impl std::error::Error for TripError {}

/// Result type alias for trip-engine operations.
pub type Result<T> = std::result::Result<T, TripError>;
