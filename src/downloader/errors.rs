// Error types for the download workflow

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::models::TaskId;

/// Rejected user input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum ValidationError {
    /// Nothing left after trimming
    #[error("Please enter a valid URL")]
    EmptyUrl,
}

/// Failure of the "get info" request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum FetchError {
    /// Remote service could not be reached
    #[error("Failed to connect to server: {0}")]
    Network(String),

    /// Remote service answered with a failure status
    #[error("Service error{}: {message}", status_suffix(.status))]
    Service { status: Option<u16>, message: String },

    /// No answer within the configured bound
    #[error("No response from server within {}s", .after.as_secs())]
    Timeout { after: Duration },
}

/// Failure of a single download task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum DownloadError {
    /// Connection lost or never established
    #[error("Download failed: {0}")]
    Network(String),

    /// Remote job reported a failure
    #[error("Download rejected by service{}: {message}", status_suffix(.status))]
    Service { status: Option<u16>, message: String },

    /// Cancelled by the user
    #[error("Download cancelled")]
    Cancelled,

    /// A primary download is already active
    #[error("Another download is already running ({active})")]
    ConcurrentDownloadRejected { active: TaskId },
}

/// Clipboard access failures are never fatal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum ClipboardError {
    #[error("Clipboard access denied: {0}")]
    PermissionDenied(String),
}

/// Format catalog lookups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum CatalogError {
    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    #[error("Format {format} has no quality {quality}")]
    UnknownQuality { format: String, quality: String },

    #[error("Invalid format catalog: {0}")]
    InvalidCatalog(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Service {
                status: Some(status.as_u16()),
                message: e.to_string(),
            },
            None => Self::Network(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Service {
                status: Some(status.as_u16()),
                message: e.to_string(),
            },
            None => Self::Network(e.to_string()),
        }
    }
}

// Free-form messages reported by backends. `Cancelled` is never produced
// here: it is reserved for cancellation requested through the orchestrator.
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();

        if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("connection")
            || lower.contains("unreachable")
            || lower.contains("network")
        {
            return Self::Network(s);
        }

        let status = ["400", "403", "404", "410", "429", "500", "502", "503"]
            .iter()
            .find(|code| s.contains(*code))
            .and_then(|code| code.parse().ok());

        Self::Service { status, message: s }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_classification() {
        assert!(matches!(
            DownloadError::from("connection reset by peer".to_string()),
            DownloadError::Network(_)
        ));
        assert_eq!(
            DownloadError::from("job cancelled by admin".to_string()),
            DownloadError::Service {
                status: None,
                message: "job cancelled by admin".to_string(),
            }
        );
        assert_eq!(
            DownloadError::from("HTTP 429 Too Many Requests".to_string()),
            DownloadError::Service {
                status: Some(429),
                message: "HTTP 429 Too Many Requests".to_string(),
            }
        );
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(ValidationError::EmptyUrl.to_string(), "Please enter a valid URL");
        let err = FetchError::Service {
            status: Some(503),
            message: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "Service error (HTTP 503): busy");
        let err = FetchError::Timeout {
            after: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "No response from server within 10s");
        let err = DownloadError::ConcurrentDownloadRejected { active: TaskId(3) };
        assert_eq!(err.to_string(), "Another download is already running (task-3)");
    }
}
