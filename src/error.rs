//! Unified error handling for the plaquer-core library.
//!
//! Errors fall into the classes the map core distinguishes: data errors
//! (skipped and logged), external service errors (recovered with a fallback),
//! user-input errors (rejected with a notice) and internal errors.

use thiserror::Error;

use crate::plaque::PlaqueId;

/// Unified error type for plaquer-core operations.
#[derive(Debug, Clone, Error)]
pub enum PlaquerError {
    /// Plaque has missing or unparseable coordinates
    #[error("Plaque {plaque_id} has invalid coordinates: {message}")]
    InvalidCoordinates { plaque_id: PlaqueId, message: String },

    /// Plaque is already part of the route
    #[error("\"{title}\" is already in your route")]
    DuplicateWaypoint { plaque_id: PlaqueId, title: String },

    /// Operation needs more waypoints than the route has
    #[error("Add at least {minimum} stops to optimize the route (currently {count})")]
    TooFewWaypoints { count: usize, minimum: usize },

    /// No plaque with this id is known to the component
    #[error("Unknown plaque {plaque_id}")]
    UnknownPlaque { plaque_id: PlaqueId },

    /// Waypoint index out of range
    #[error("Waypoint index {index} out of range for route of {len} stops")]
    InvalidIndex { index: usize, len: usize },

    /// HTTP/API error
    #[error("HTTP error{}: {message}", status_suffix(.status_code))]
    Http {
        message: String,
        status_code: Option<u16>,
    },

    /// Directions service returned something unusable
    #[error("Directions error: {message}")]
    Directions { message: String },

    /// Map engine failed to load or render
    #[error("Map engine error: {message}")]
    MapEngine { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Dataset could not be read or parsed
    #[error("Data error: {message}")]
    Data { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PlaquerError {
    /// Whether this error is a rejected user action whose message should be
    /// shown to the user as-is.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            PlaquerError::DuplicateWaypoint { .. }
                | PlaquerError::TooFewWaypoints { .. }
                | PlaquerError::InvalidIndex { .. }
        )
    }
}

impl From<serde_json::Error> for PlaquerError {
    fn from(e: serde_json::Error) -> Self {
        PlaquerError::Data {
            message: e.to_string(),
        }
    }
}

impl From<std::io::Error> for PlaquerError {
    fn from(e: std::io::Error) -> Self {
        PlaquerError::Data {
            message: e.to_string(),
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for PlaquerError {
    fn from(e: reqwest::Error) -> Self {
        PlaquerError::Http {
            status_code: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

fn status_suffix(status_code: &Option<u16>) -> String {
    status_code.map(|c| format!(" ({})", c)).unwrap_or_default()
}

/// Result type alias for plaquer-core operations.
pub type Result<T> = std::result::Result<T, PlaquerError>;

/// Extension trait for converting Option to PlaquerError.
pub trait OptionExt<T> {
    /// Convert Option to Result with an invalid coordinates error.
    fn ok_or_invalid_coordinates(self, plaque_id: PlaqueId, message: &str) -> Result<T>;

    /// Convert Option to Result with generic internal error.
    fn ok_or_internal(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_invalid_coordinates(self, plaque_id: PlaqueId, message: &str) -> Result<T> {
        self.ok_or_else(|| PlaquerError::InvalidCoordinates {
            plaque_id,
            message: message.to_string(),
        })
    }

    fn ok_or_internal(self, message: &str) -> Result<T> {
        self.ok_or_else(|| PlaquerError::Internal {
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlaquerError::DuplicateWaypoint {
            plaque_id: 42,
            title: "Charles Dickens".to_string(),
        };
        assert_eq!(err.to_string(), "\"Charles Dickens\" is already in your route");

        let err = PlaquerError::Http {
            message: "Forbidden".to_string(),
            status_code: Some(403),
        };
        assert_eq!(err.to_string(), "HTTP error (403): Forbidden");

        let err = PlaquerError::Http {
            message: "connection refused".to_string(),
            status_code: None,
        };
        assert_eq!(err.to_string(), "HTTP error: connection refused");
    }

    #[test]
    fn test_user_facing_classification() {
        assert!(PlaquerError::TooFewWaypoints { count: 2, minimum: 3 }.is_user_facing());
        assert!(!PlaquerError::Directions {
            message: "empty".to_string()
        }
        .is_user_facing());
    }

    #[test]
    fn test_option_ext() {
        let none: Option<f64> = None;
        let result = none.ok_or_invalid_coordinates(7, "latitude missing");
        assert!(matches!(
            result,
            Err(PlaquerError::InvalidCoordinates { plaque_id: 7, .. })
        ));
    }
}
