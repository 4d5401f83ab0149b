//! Error types for calls that pass through the funnel.
//!
//! Every failure a caller can observe is one [`Error`] value. A call that was
//! intercepted by a business-code handler is not an error: it is reported as
//! [`Outcome::Intercepted`](crate::Outcome::Intercepted) instead.

use http::StatusCode;

/// Broad category of a transport-level failure.
///
/// Each kind maps to a stable numeric [`code`](TransportErrorKind::code) so that
/// call sites can branch on it or forward it to analytics without matching on
/// message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The configured timeout expired before a response arrived.
    Timeout,
    /// The connection could not be established (DNS, refused, TLS handshake).
    Connect,
    /// The request could not be sent.
    Request,
    /// The response body could not be read.
    Body,
    /// Anything else the transport reported.
    Other,
}

impl TransportErrorKind {
    /// Returns the numeric code reported alongside this kind.
    pub fn code(self) -> i64 {
        match self {
            TransportErrorKind::Timeout => -1001,
            TransportErrorKind::Connect => -1004,
            TransportErrorKind::Request => -1005,
            TransportErrorKind::Body => -1017,
            TransportErrorKind::Other => -1,
        }
    }

    pub(crate) fn classify(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportErrorKind::Timeout
        } else if error.is_connect() {
            TransportErrorKind::Connect
        } else if error.is_body() || error.is_decode() {
            TransportErrorKind::Body
        } else if error.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        }
    }
}

/// The main error type for calls made through a [`Client`](crate::Client).
///
/// # Examples
///
/// ```no_run
/// use conduit::{Client, Error, Outcome, Target};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// match client.request_json(Target::get("/profile"), None).await {
///     Outcome::Success(response) => println!("{}", response.data),
///     Outcome::Failure(Error::Status { status, raw_response, .. }) => {
///         eprintln!("HTTP {}: {}", status, raw_response);
///     }
///     Outcome::Failure(e) => eprintln!("call failed: {}", e),
///     Outcome::Intercepted(_) => {}
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The call could not be built from the current configuration,
    /// most often because no base URL is resolvable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The transport failed before any HTTP response was received.
    ///
    /// Covers DNS, connect, TLS, timeout and cancellation failures.
    #[error("Transport error ({}): {message}", kind.code())]
    Transport {
        /// Category of the failure
        kind: TransportErrorKind,
        /// Message supplied by the transport
        message: String,
    },

    /// An HTTP response arrived but its status is not the configured success status.
    #[error("HTTP error {status} for {path}: {raw_response}")]
    Status {
        /// The HTTP status code
        status: StatusCode,
        /// The target path of the call
        path: String,
        /// The raw response body
        raw_response: String,
    },

    /// The response body could not be read as JSON text at all.
    ///
    /// Parseable JSON that simply does not match the requested model never
    /// produces this error; it degrades to defaults instead.
    #[error("Failed to decode response: {reason}")]
    Decode {
        /// Why the body was rejected
        reason: String,
        /// The body, lossily converted to text
        raw_response: String,
    },

    /// Parameters or body could not be encoded for the wire.
    #[error("Failed to serialize request: {0}")]
    Serialization(String),

    /// Reading an upload part or writing a download failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An invalid URL was provided or resolved.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A completion was settled more than once.
    #[error("Completion was already settled")]
    AlreadySettled,

    /// The pipeline ended without settling its completion.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn transport(error: reqwest::Error) -> Self {
        Error::Transport {
            kind: TransportErrorKind::classify(&error),
            message: error.to_string(),
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::Status { raw_response, .. } => Some(raw_response),
            Error::Decode { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    /// Returns the numeric code carried by this error.
    ///
    /// Transport failures report their [`TransportErrorKind::code`], status
    /// errors report the HTTP status. Other errors have no code.
    ///
    /// ```
    /// use conduit::{Error, TransportErrorKind};
    ///
    /// let err = Error::Transport {
    ///     kind: TransportErrorKind::Timeout,
    ///     message: "timed out".to_string(),
    /// };
    /// assert_eq!(err.code(), Some(-1001));
    /// assert!(err.is_timeout());
    /// ```
    pub fn code(&self) -> Option<i64> {
        match self {
            Error::Transport { kind, .. } => Some(kind.code()),
            Error::Status { status, .. } => Some(i64::from(status.as_u16())),
            _ => None,
        }
    }

    /// Returns `true` if the transport gave up because the timeout expired.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Transport {
                kind: TransportErrorKind::Timeout,
                ..
            }
        )
    }
}

/// A specialized `Result` type for calls made through the funnel.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_accessors() {
        let err = Error::Status {
            status: StatusCode::NOT_FOUND,
            path: "/users".to_string(),
            raw_response: "missing".to_string(),
        };

        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.raw_response(), Some("missing"));
        assert_eq!(err.code(), Some(404));
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("/users"));
    }

    #[test]
    fn test_configuration_error_has_no_code() {
        let err = Error::Configuration("no base URL".to_string());
        assert_eq!(err.code(), None);
        assert_eq!(err.status(), None);
        assert_eq!(err.raw_response(), None);
    }

    #[test]
    fn test_transport_codes_are_distinct() {
        let kinds = [
            TransportErrorKind::Timeout,
            TransportErrorKind::Connect,
            TransportErrorKind::Request,
            TransportErrorKind::Body,
            TransportErrorKind::Other,
        ];
        let codes: std::collections::HashSet<i64> = kinds.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), kinds.len());
    }
}
