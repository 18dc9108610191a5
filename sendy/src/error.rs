//! Error types for sendy.
//!
//! Errors are captured at their first occurrence and carried as data on the
//! [`Request`](crate::Request) or [`Response`](crate::Response) that produced
//! them. Nothing in the builder chain panics or returns early; the caller asks
//! for the outcome with [`Response::error`](crate::Response::error).

use quick_xml::errors::serialize::{DeError, SeError};
use sendy_retries::Transient;
use std::time::Duration;
use thiserror::Error;

/// The main error type for sendy operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The request could not be built.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// The network exchange failed, after any retries.
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The overall deadline for the exchange passed.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The attached cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// The response body did not match the requested shape.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A response was received with a status code of 300 or more.
    #[error("Status code: {0}")]
    Status(u16),
}

/// Result type alias using sendy's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// The status code carried by a status error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            _ => None,
        }
    }

    /// Check if this is a status error.
    pub fn is_status(&self) -> bool {
        matches!(self, Self::Status(_))
    }

    /// Check if the exchange ran out of time, either per attempt or overall.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Check if this error happened before anything was sent.
    pub fn is_build(&self) -> bool {
        matches!(self, Self::Build(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e)
    }
}

impl Transient for Error {
    fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Errors raised while assembling a request.
#[derive(Error, Debug)]
pub enum BuildError {
    /// JSON body encoding failed.
    #[error("failed to encode JSON body: {0}")]
    Json(#[source] serde_json::Error),

    /// XML body encoding failed.
    #[error("failed to encode XML body: {0}")]
    Xml(#[source] SeError),

    /// A multipart source could not be opened or read.
    #[error("failed to read multipart entry `{key}`: {source}")]
    Io {
        /// Form key of the failing entry.
        key: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Host, path and query did not form a valid URL.
    #[error("invalid URL `{url}`: {source}")]
    InvalidUrl {
        /// The assembled URL.
        url: String,
        /// Parser error.
        #[source]
        source: url::ParseError,
    },

    /// A header name was not a valid HTTP token.
    #[error("invalid header name `{0}`")]
    InvalidHeaderName(String),

    /// A header value contained forbidden bytes.
    #[error("invalid value for header `{0}`")]
    InvalidHeaderValue(String),

    /// A hook replaced the body with a stream that cannot be sent again.
    #[error("request body cannot be replayed for another attempt")]
    UnreplayableBody,
}

/// Errors raised while decoding a response body.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The body was not the expected JSON.
    #[error("failed to decode JSON body: {0}")]
    Json(#[source] serde_json::Error),

    /// The body was not the expected XML.
    #[error("failed to decode XML body: {0}")]
    Xml(#[source] DeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = Error::Status(404);
        assert_eq!(err.to_string(), "Status code: 404");
        assert_eq!(err.status(), Some(404));
        assert!(err.is_status());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_build_error_is_transparent() {
        let json_error = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = Error::from(BuildError::Json(json_error));

        assert!(err.is_build());
        assert!(err.to_string().starts_with("failed to encode JSON body"));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_timeout_and_cancel_are_not_transient() {
        let err = Error::Timeout(Duration::from_secs(36));
        assert!(err.is_timeout());
        assert!(!err.is_transient());
        assert!(err.to_string().contains("36s"));

        assert!(!Error::Cancelled.is_transient());
        assert!(!Error::Cancelled.is_timeout());
    }

    #[test]
    fn test_io_error_names_entry() {
        let err = BuildError::Io {
            key: "upload".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("`upload`"));
    }
}
