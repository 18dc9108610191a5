//! # sendy - fluent HTTP requests against a single host
//!
//! sendy removes the boilerplate around building, sending and decoding HTTP
//! requests. A [`Client`] holds the configuration shared by every request to
//! one host; a [`Request`] accumulates the details of one call; the terminal
//! [`Request::send`] performs the exchange and yields a [`Response`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use serde::Deserialize;
//!
//! #[derive(Default, Deserialize)]
//! struct Todo {
//!     #[serde(rename = "userId")]
//!     user_id: u32,
//!     title: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sendy::Error> {
//!     let mut todo = Todo::default();
//!
//!     sendy::get("https://jsonplaceholder.typicode.com")
//!         .path("/todos/1")
//!         .send()
//!         .await
//!         .json(&mut todo)
//!         .error()?;
//!
//!     println!("{}", todo.title);
//!     Ok(())
//! }
//! ```
//!
//! ## Key Features
//!
//! - **Sticky errors**: the first failure is stored and every later chained
//!   call becomes a no-op, so a chain needs a single check at the end
//! - **Retries** of transport failures with exponential jitter backoff,
//!   invisible to the caller (see [`sendy_retries`])
//! - **Bodies** as JSON, XML, URL-encoded form or multipart form
//! - **Hooks** that see the assembled request right before transmission
//! - **Cancellation** through a [`CancellationToken`]
//!
//! ## Error Precedence
//!
//! [`Response::error`] reports a stored error (build, transport, timeout,
//! cancellation or decode) before looking at the status code; a received
//! status of 300 or more becomes [`Error::Status`].

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod error;
pub mod hooks;
pub mod multipart;
pub mod params;
pub mod request;
pub mod response;

pub use client::{Client, DEFAULT_USER_AGENT};
pub use error::{BuildError, DecodeError, Error, Result};
pub use hooks::{dump_request, DumpRequest, Hook, Hooks};
pub use multipart::{FormEntry, FormValue, Multipart};
pub use params::{Header, Param, Params};
pub use request::{Request, CONTENT_TYPE_XML};
pub use response::Response;

/// Retry policy and backoff.
pub use sendy_retries as retries;
pub use sendy_retries::RetryPolicy;

pub use reqwest::Method;
pub use tokio_util::sync::CancellationToken;

// ============================================================================
// Default-client shorthands
// ============================================================================

fn default_client(host: impl Into<String>) -> Client {
    Client::new().host(host)
}

/// Start a GET request to `host` with the default client configuration.
pub fn get(host: impl Into<String>) -> Request {
    default_client(host).get()
}

/// Start a POST request to `host` with the default client configuration.
pub fn post(host: impl Into<String>) -> Request {
    default_client(host).post()
}

/// Start a PUT request to `host` with the default client configuration.
pub fn put(host: impl Into<String>) -> Request {
    default_client(host).put()
}

/// Start a PATCH request to `host` with the default client configuration.
pub fn patch(host: impl Into<String>) -> Request {
    default_client(host).patch()
}

/// Start a DELETE request to `host` with the default client configuration.
pub fn delete(host: impl Into<String>) -> Request {
    default_client(host).delete()
}

/// Start a HEAD request to `host` with the default client configuration.
pub fn head(host: impl Into<String>) -> Request {
    default_client(host).head()
}

/// Start an OPTIONS request to `host` with the default client configuration.
pub fn options(host: impl Into<String>) -> Request {
    default_client(host).options()
}

/// Start a TRACE request to `host` with the default client configuration.
pub fn trace(host: impl Into<String>) -> Request {
    default_client(host).trace()
}

/// Start a CONNECT request to `host` with the default client configuration.
pub fn connect(host: impl Into<String>) -> Request {
    default_client(host).connect()
}

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        CancellationToken, Client, Error, FormEntry, Hook, Method, Request, Response, Result,
        RetryPolicy,
    };
}
