//! Call results.
//!
//! A finished call is one [`Outcome`]: a decoded [`Response`], an
//! [`Error`], or an [`Interception`] that withheld the response from its
//! caller on purpose.

use crate::{intercept::Interception, Error, Result};
use http::{HeaderMap, StatusCode};
use std::path::PathBuf;
use std::time::Duration;

/// A successful, decoded response together with its transport details.
///
/// # Examples
///
/// ```
/// # use conduit::Response;
/// # use http::{HeaderMap, StatusCode};
/// # use std::time::Duration;
/// let response = Response::new(
///     42,
///     r#"{"code":0,"data":42}"#.to_string(),
///     StatusCode::OK,
///     HeaderMap::new(),
///     Duration::from_millis(100),
/// );
///
/// let text = response.map(|n| n.to_string());
/// assert_eq!(text.data, "42");
/// assert_eq!(*text, "42");
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The decoded model.
    pub data: T,

    /// The raw response body as text. Empty for downloads.
    pub raw_body: String,

    pub status: StatusCode,

    pub headers: HeaderMap,

    /// Time from dispatch until the response was received.
    pub latency: Duration,

    /// Business code from the response envelope, if present.
    pub code: Option<i64>,

    /// Business message from the response envelope, if present.
    pub message: Option<String>,

    /// Where a download was written.
    pub saved_to: Option<PathBuf>,
}

impl<T> Response<T> {
    pub fn new(
        data: T,
        raw_body: String,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
    ) -> Self {
        Self {
            data,
            raw_body,
            status,
            headers,
            latency,
            code: None,
            message: None,
            saved_to: None,
        }
    }

    /// Maps the response data to a different type, keeping the metadata.
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            code: self.code,
            message: self.message,
            saved_to: self.saved_to,
        }
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

/// How a call ended.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(Response<T>),
    Failure(Error),
    /// A listener or intercept handler took the response; the caller gets nothing.
    Intercepted(Interception),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    pub fn is_intercepted(&self) -> bool {
        matches!(self, Outcome::Intercepted(_))
    }

    pub fn success(self) -> Option<Response<T>> {
        match self {
            Outcome::Success(response) => Some(response),
            _ => None,
        }
    }

    pub fn failure(self) -> Option<Error> {
        match self {
            Outcome::Failure(error) => Some(error),
            _ => None,
        }
    }

    /// Converts to a `Result`, or `None` if the call was intercepted.
    pub fn into_result(self) -> Option<Result<Response<T>>> {
        match self {
            Outcome::Success(response) => Some(Ok(response)),
            Outcome::Failure(error) => Some(Err(error)),
            Outcome::Intercepted(_) => None,
        }
    }

    /// Maps the data of a successful outcome.
    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Outcome::Success(response) => Outcome::Success(response.map(f)),
            Outcome::Failure(error) => Outcome::Failure(error),
            Outcome::Intercepted(interception) => Outcome::Intercepted(interception),
        }
    }
}

impl<T> From<Result<Response<T>>> for Outcome<T> {
    fn from(result: Result<Response<T>>) -> Self {
        match result {
            Ok(response) => Outcome::Success(response),
            Err(error) => Outcome::Failure(error),
        }
    }
}
