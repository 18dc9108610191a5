//! Client configuration and request factories.

use crate::hooks::{DumpRequest, Hook, Hooks};
use crate::params::Header;
use crate::request::Request;
use reqwest::Method;
use sendy_retries::{RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_PER_ATTEMPT_TIMEOUT};
use std::time::Duration;

/// Default `User-Agent` sent by every client.
pub const DEFAULT_USER_AGENT: &str = concat!("sendy/", env!("CARGO_PKG_VERSION"));

/// Basic auth credentials.
#[derive(Clone, Default, PartialEq, Eq)]
pub(crate) struct Credentials {
    pub(crate) username: String,
    pub(crate) password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub(crate) fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Credentials are sent when either half is non-empty.
    pub(crate) fn is_set(&self) -> bool {
        !self.username.is_empty() || !self.password.is_empty()
    }
}

/// Reusable configuration for requests to a single host.
///
/// Configure once, then derive any number of [`Request`]s. Each request takes
/// a snapshot of the configuration, so later changes to the client never
/// reach requests that already exist.
///
/// ```ignore
/// let client = sendy::Client::new()
///     .host("https://api.example.com")
///     .basic_auth("user", "secret")
///     .header("Accept", "application/json");
///
/// let response = client.get().path("/todos/1").send().await;
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    pub(crate) transport: reqwest::Client,
    pub(crate) host: String,
    pub(crate) credentials: Credentials,
    pub(crate) headers: Vec<Header>,
    pub(crate) hooks: Hooks,
    pub(crate) policy: RetryPolicy,
    pub(crate) timeout: Option<Duration>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a client with the default retry policy: 3 retries, 12 seconds
    /// per attempt, 36 seconds overall.
    pub fn new() -> Self {
        Self::bare().with_retries_and_timeout(DEFAULT_MAX_RETRIES, DEFAULT_PER_ATTEMPT_TIMEOUT)
    }

    /// Create a client without retries or timeouts.
    pub fn bare() -> Self {
        Self {
            transport: reqwest::Client::new(),
            host: String::new(),
            credentials: Credentials::default(),
            headers: vec![Header::new(reqwest::header::USER_AGENT.as_str(), DEFAULT_USER_AGENT)],
            hooks: Hooks::default(),
            policy: RetryPolicy::none(),
            timeout: None,
        }
    }

    /// Set the host, the prefix of every request URL.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Use `transport` for the network exchange.
    ///
    /// Proxying, TLS and connection reuse are configured on the transport.
    pub fn transport(mut self, transport: reqwest::Client) -> Self {
        self.transport = transport;
        self
    }

    /// Set the overall timeout of a send, retries included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replace the retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Retry transient failures up to `max_retries` times, bound each attempt
    /// by `per_attempt_timeout`, and bound the whole send by
    /// `max_retries * per_attempt_timeout`.
    pub fn with_retries_and_timeout(self, max_retries: u32, per_attempt_timeout: Duration) -> Self {
        let policy = RetryPolicy::new(max_retries, per_attempt_timeout);
        let overall = policy.overall_timeout();
        let mut client = self.retry_policy(policy);
        client.timeout = overall;
        client
    }

    /// Append a default header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(key, value));
        self
    }

    /// Set the `User-Agent` header.
    pub fn user_agent(self, user_agent: impl Into<String>) -> Self {
        self.header(reqwest::header::USER_AGENT.as_str(), user_agent)
    }

    /// Set basic auth credentials for every request.
    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Credentials::new(username, password);
        self
    }

    /// Append a hook run right before every request is sent.
    pub fn hook(mut self, hook: impl Hook + 'static) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Log the full contents of every request.
    pub fn dump_requests(self) -> Self {
        self.hook(DumpRequest)
    }

    /// The configured host.
    pub fn host_str(&self) -> &str {
        &self.host
    }

    /// The configured retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The overall timeout, if any.
    pub fn overall_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Start a request with `method`.
    pub fn request(&self, method: Method) -> Request {
        Request::from_client(self).method(method)
    }

    /// Start a GET request.
    pub fn get(&self) -> Request {
        self.request(Method::GET)
    }

    /// Start a POST request.
    pub fn post(&self) -> Request {
        self.request(Method::POST)
    }

    /// Start a PUT request.
    pub fn put(&self) -> Request {
        self.request(Method::PUT)
    }

    /// Start a PATCH request.
    pub fn patch(&self) -> Request {
        self.request(Method::PATCH)
    }

    /// Start a DELETE request.
    pub fn delete(&self) -> Request {
        self.request(Method::DELETE)
    }

    /// Start a HEAD request.
    pub fn head(&self) -> Request {
        self.request(Method::HEAD)
    }

    /// Start an OPTIONS request.
    pub fn options(&self) -> Request {
        self.request(Method::OPTIONS)
    }

    /// Start a TRACE request.
    pub fn trace(&self) -> Request {
        self.request(Method::TRACE)
    }

    /// Start a CONNECT request.
    pub fn connect(&self) -> Request {
        self.request(Method::CONNECT)
    }
}
