//! Outcome of a sent request.

use crate::error::{DecodeError, Error};
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

/// The outcome of one [`Request::send`](crate::Request::send).
///
/// The body is read in full inside `send`, which also releases the
/// connection, so there is nothing to close. Decoding reads the buffered
/// snapshot and may be repeated, for instance to try two shapes.
///
/// Like the request builder, a response keeps the first error it sees:
/// once an error is stored every decode call is a no-op and
/// [`error`](Self::error) returns that original error.
#[derive(Debug)]
pub struct Response {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Bytes,
    err: Option<Error>,
}

impl Response {
    pub(crate) fn received(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status: Some(status),
            headers,
            body,
            err: None,
        }
    }

    pub(crate) fn failed(err: Error) -> Self {
        Self {
            status: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            err: Some(err),
        }
    }

    fn set_err(mut self, err: impl Into<Error>) -> Self {
        self.err = Some(err.into());
        self
    }

    /// The received status code, or `-1` when no response was received.
    pub fn status_code(&self) -> i32 {
        self.status.map_or(-1, |s| i32::from(s.as_u16()))
    }

    /// The received status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// The received headers; empty when no response was received.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The buffered body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON into `out`.
    pub fn json<T: DeserializeOwned>(self, out: &mut T) -> Self {
        if self.err.is_some() {
            return self;
        }
        match serde_json::from_slice(&self.body) {
            Ok(value) => {
                *out = value;
                self
            }
            Err(e) => self.set_err(DecodeError::Json(e)),
        }
    }

    /// Decode the body as XML into `out`.
    pub fn xml<T: DeserializeOwned>(self, out: &mut T) -> Self {
        if self.err.is_some() {
            return self;
        }
        match quick_xml::de::from_reader(self.body.as_ref()) {
            Ok(value) => {
                *out = value;
                self
            }
            Err(e) => self.set_err(DecodeError::Xml(e)),
        }
    }

    /// The stored error, without consuming the response.
    pub fn stored_error(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Classify the outcome.
    ///
    /// A stored error wins over the status, since it means the response may
    /// be incomplete. Otherwise a status of 300 or more is an
    /// [`Error::Status`].
    pub fn error(self) -> Result<(), Error> {
        if let Some(err) = self.err {
            return Err(err);
        }
        match self.status {
            Some(status) if status.as_u16() >= 300 => Err(Error::Status(status.as_u16())),
            _ => Ok(()),
        }
    }

    /// The raw body together with any stored error.
    pub fn raw(self) -> (Bytes, Option<Error>) {
        (self.body, self.err)
    }
}
