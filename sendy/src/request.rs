//! Fluent request builder.

use crate::client::{Client, Credentials};
use crate::error::{BuildError, Error};
use crate::hooks::{DumpRequest, Hook, Hooks};
use crate::multipart::{self, FormEntry};
use crate::params::{Header, Params};
use crate::response::Response;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Method;
use sendy_retries::{with_retry, RetryPolicy};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Content type of XML bodies.
pub const CONTENT_TYPE_XML: &str = "application/xml";

/// An encoded body together with the headers that describe it.
struct Body {
    bytes: Bytes,
    content_type: Option<String>,
    content_length: bool,
}

impl Body {
    fn raw(bytes: Bytes) -> Self {
        Self {
            bytes,
            content_type: None,
            content_length: false,
        }
    }

    fn typed(bytes: Bytes, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: Some(content_type.into()),
            content_length: true,
        }
    }
}

/// A request under construction.
///
/// Every builder method consumes the request and hands it back, so calls
/// chain. The first failure is stored and turns every later call into a
/// no-op; [`send`](Self::send) then returns a [`Response`] carrying it.
///
/// ```ignore
/// let mut created = Created::default();
/// let result = sendy::post("https://api.example.com")
///     .path("/posts")
///     .json(&NewPost { id: 101 })
///     .send()
///     .await
///     .json(&mut created)
///     .error();
/// ```
#[derive(Debug)]
pub struct Request {
    transport: reqwest::Client,
    policy: RetryPolicy,
    timeout: Option<Duration>,
    host: String,
    hooks: Hooks,
    method: Method,
    path: String,
    params: Params,
    url_encoded_params: Params,
    headers: Vec<Header>,
    credentials: Credentials,
    body: Option<Bytes>,
    /// Positions in `headers` written by the last body setter.
    body_headers: Vec<usize>,
    cancel: Option<CancellationToken>,
    err: Option<Error>,
}

impl Request {
    pub(crate) fn from_client(client: &Client) -> Self {
        Self {
            transport: client.transport.clone(),
            policy: client.policy,
            timeout: client.timeout,
            host: client.host.clone(),
            hooks: client.hooks.clone(),
            method: Method::GET,
            path: String::new(),
            params: Params::new(),
            url_encoded_params: Params::new(),
            headers: client.headers.clone(),
            credentials: client.credentials.clone(),
            body: None,
            body_headers: Vec::new(),
            cancel: None,
            err: None,
        }
    }

    /// Apply `f` unless an error is already stored.
    fn update(mut self, f: impl FnOnce(&mut Self)) -> Self {
        if self.err.is_none() {
            f(&mut self);
        }
        self
    }

    /// Apply the fallible `f` unless an error is already stored; a failure
    /// becomes the stored error and leaves the rest of the state untouched.
    fn try_update(mut self, f: impl FnOnce() -> Result<Body, BuildError>) -> Self {
        if self.err.is_some() {
            return self;
        }
        match f() {
            Ok(body) => self.set_body(body),
            Err(e) => self.err = Some(e.into()),
        }
        self
    }

    /// Replace the body slot.
    ///
    /// Headers written by the previous body are dropped and the new body's
    /// headers are appended, so they replace anything set before this call
    /// and yield to anything set after it.
    fn set_body(&mut self, body: Body) {
        let stale = std::mem::take(&mut self.body_headers);
        if !stale.is_empty() {
            let mut index = 0;
            self.headers.retain(|_| {
                let keep = !stale.contains(&index);
                index += 1;
                keep
            });
        }

        if let Some(content_type) = body.content_type {
            self.push_body_header(CONTENT_TYPE.as_str(), content_type);
        }
        if body.content_length {
            self.push_body_header(CONTENT_LENGTH.as_str(), body.bytes.len().to_string());
        }
        self.body = Some(body.bytes);
    }

    fn push_body_header(&mut self, key: &str, value: String) {
        self.body_headers.push(self.headers.len());
        self.headers.push(Header::new(key, value));
    }

    /// The stored error, if any.
    pub fn stored_error(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Override the HTTP method.
    pub fn method(self, method: Method) -> Self {
        self.update(|r| r.method = method)
    }

    /// Override the path appended to the host.
    pub fn path(self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.update(|r| r.path = path)
    }

    /// Append a URL query parameter.
    pub fn param(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        self.update(|r| r.params.push(key, value))
    }

    /// Append a form parameter.
    ///
    /// When any form parameter is set the body is sent as
    /// `application/x-www-form-urlencoded`, whatever other body was set.
    pub fn url_encoded_param(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        self.update(|r| r.url_encoded_params.push(key, value))
    }

    /// Append a header. A later header with the same name replaces it.
    pub fn header(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let header = Header::new(key, value);
        self.update(|r| r.headers.push(header))
    }

    /// Set the `User-Agent` header.
    pub fn user_agent(self, user_agent: impl Into<String>) -> Self {
        self.header(reqwest::header::USER_AGENT.as_str(), user_agent)
    }

    /// Set basic auth credentials.
    pub fn basic_auth(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        let credentials = Credentials::new(username, password);
        self.update(|r| r.credentials = credentials)
    }

    /// Append a hook, run after the client's hooks.
    pub fn hook(self, hook: impl Hook + 'static) -> Self {
        self.update(|r| r.hooks.push(hook))
    }

    /// Log the full contents of this request when it is sent.
    pub fn dump(self) -> Self {
        self.hook(DumpRequest)
    }

    /// Abort the send when `token` is cancelled.
    pub fn cancel_on(self, token: CancellationToken) -> Self {
        self.update(|r| r.cancel = Some(token))
    }

    /// Override the overall timeout for this request.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.update(|r| r.timeout = Some(timeout))
    }

    /// Send `raw` verbatim as the body.
    pub fn raw_body(self, raw: impl Into<Bytes>) -> Self {
        let raw = raw.into();
        self.try_update(|| Ok(Body::raw(raw)))
    }

    /// Encode `value` as the JSON body.
    ///
    /// `Content-Length` is taken from the encoded bytes.
    pub fn json<T: Serialize>(self, value: &T) -> Self {
        self.try_update(|| {
            let encoded = serde_json::to_vec(value).map_err(BuildError::Json)?;
            Ok(Body::typed(encoded.into(), mime::APPLICATION_JSON.as_ref()))
        })
    }

    /// Encode `value` as the XML body.
    ///
    /// `Content-Length` is taken from the encoded bytes.
    pub fn xml<T: Serialize>(self, value: &T) -> Self {
        self.try_update(|| {
            let encoded = quick_xml::se::to_string(value).map_err(BuildError::Xml)?;
            Ok(Body::typed(encoded.into(), CONTENT_TYPE_XML))
        })
    }

    /// Encode `entries` as a `multipart/form-data` body.
    pub fn multipart_form(self, entries: Vec<FormEntry>) -> Self {
        self.try_update(move || {
            let (bytes, content_type) = multipart::encode(entries)?;
            Ok(Body::typed(bytes, content_type))
        })
    }

    /// The URL this request will be sent to.
    pub fn url(&self) -> String {
        if self.params.is_empty() {
            format!("{}{}", self.host, self.path)
        } else {
            format!("{}{}?{}", self.host, self.path, self.params.encode())
        }
    }

    /// The encoded form, when any form parameter was set.
    fn form_body(&self) -> Option<Bytes> {
        (!self.url_encoded_params.is_empty()).then(|| self.url_encoded_params.encode().into())
    }

    /// Assemble the outgoing request, before hooks run.
    ///
    /// Headers are applied with set semantics in this order: basic auth, the
    /// accumulated headers in call order (body headers included), then the
    /// form headers when form parameters replace the body.
    fn assemble(&self) -> Result<reqwest::Request, BuildError> {
        let url = self.url();
        let parsed = url::Url::parse(&url).map_err(|source| BuildError::InvalidUrl {
            url: url.clone(),
            source,
        })?;

        let mut request = reqwest::Request::new(self.method.clone(), parsed);
        *request.timeout_mut() = self.policy.per_attempt_timeout;

        let form = self.form_body();
        if let Some(bytes) = form.clone().or_else(|| self.body.clone()) {
            *request.body_mut() = Some(reqwest::Body::from(bytes));
        }

        if self.credentials.is_set() {
            let token = STANDARD.encode(format!(
                "{}:{}",
                self.credentials.username, self.credentials.password
            ));
            let mut value = header_value(AUTHORIZATION.as_str(), &format!("Basic {token}"))?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        for header in &self.headers {
            let name = HeaderName::from_bytes(header.key.as_bytes())
                .map_err(|_| BuildError::InvalidHeaderName(header.key.clone()))?;
            let value = header_value(&header.key, &header.value)?;
            request.headers_mut().insert(name, value);
        }

        if let Some(form) = &form {
            let content_type = mime::APPLICATION_WWW_FORM_URLENCODED;
            let headers = request.headers_mut();
            headers.insert(
                CONTENT_TYPE,
                header_value(CONTENT_TYPE.as_str(), content_type.as_ref())?,
            );
            headers.insert(CONTENT_LENGTH, HeaderValue::from(form.len()));
        }

        Ok(request)
    }

    /// Send the request and capture the outcome.
    ///
    /// Transient transport failures are retried under the client's policy,
    /// invisibly to the caller. The overall timeout and the cancellation
    /// token, when set, bound the whole exchange including the body read.
    pub async fn send(mut self) -> Response {
        if let Some(err) = self.err.take() {
            return Response::failed(err);
        }

        let mut outgoing = match self.assemble() {
            Ok(request) => request,
            Err(e) => return Response::failed(e.into()),
        };
        self.hooks.run(&mut outgoing);

        debug!(
            method = %outgoing.method(),
            url = %outgoing.url(),
            max_retries = self.policy.max_retries,
            "Sending request"
        );

        let attempts = exchange(&self.transport, &self.policy, outgoing);
        let bounded = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, attempts)
                    .await
                    .unwrap_or(Err(Error::Timeout(limit))),
                None => attempts.await,
            }
        };

        let outcome = match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(Error::Cancelled),
                outcome = bounded => outcome,
            },
            None => bounded.await,
        };

        match outcome {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "Request failed");
                Response::failed(e)
            }
        }
    }
}

/// Run the request under the retry policy and buffer the response body.
async fn exchange(
    transport: &reqwest::Client,
    policy: &RetryPolicy,
    outgoing: reqwest::Request,
) -> Result<Response, Error> {
    let response = with_retry(policy, || {
        let attempt = outgoing.try_clone();
        async move {
            let attempt = attempt.ok_or(BuildError::UnreplayableBody)?;
            transport.execute(attempt).await.map_err(Error::from)
        }
    })
    .await?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?;

    debug!(status = status.as_u16(), bytes = body.len(), "Received response");

    Ok(Response::received(status, headers, body))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, BuildError> {
    HeaderValue::from_str(value).map_err(|_| BuildError::InvalidHeaderValue(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Default, Deserialize)]
    struct TestTodoObject {
        #[serde(rename = "userId")]
        user_id: u32,
        title: String,
    }

    #[derive(Debug, Default, Deserialize)]
    struct TestPostObject {
        id: u32,
    }

    /// Serializer that always fails, for injecting build errors.
    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refusing to serialize"))
        }
    }

    fn client(host: &str) -> Client {
        Client::bare().host(host)
    }

    fn assembled(request: &Request) -> reqwest::Request {
        request.assemble().expect("request should assemble")
    }

    fn header_str<'a>(request: &'a reqwest::Request, name: &str) -> &'a str {
        request.headers()[name].to_str().unwrap()
    }

    // ------------------------------------------------------------------
    // Assembly
    // ------------------------------------------------------------------

    #[test]
    fn test_url_without_params_has_no_question_mark() {
        let request = client("https://api.example.com").get().path("/todos/1");
        assert_eq!(request.url(), "https://api.example.com/todos/1");
        assert_eq!(assembled(&request).url().as_str(), "https://api.example.com/todos/1");
    }

    #[test]
    fn test_url_params_are_encoded_and_sorted() {
        let request = client("https://api.example.com")
            .get()
            .path("/search")
            .param("q", "rust lang")
            .param("page", "2")
            .param("page", "3");

        assert_eq!(request.url(), "https://api.example.com/search?page=3&q=rust+lang");
    }

    #[test]
    fn test_json_sets_exact_content_length() {
        let body = BTreeMap::from([("id", 101)]);
        let request = client("https://api.example.com").post().json(&body);
        let outgoing = assembled(&request);

        let encoded = serde_json::to_vec(&body).unwrap();
        assert_eq!(encoded, br#"{"id":101}"#);
        assert_eq!(header_str(&outgoing, "content-type"), "application/json");
        assert_eq!(
            header_str(&outgoing, "content-length"),
            encoded.len().to_string()
        );
        assert_eq!(outgoing.body().and_then(|b| b.as_bytes()), Some(&encoded[..]));
    }

    #[test]
    fn test_xml_sets_type_and_length() {
        #[derive(Serialize)]
        #[serde(rename = "note")]
        struct Note {
            to: String,
        }

        let request = client("https://api.example.com").post().xml(&Note {
            to: "Tove".to_string(),
        });
        let outgoing = assembled(&request);
        let body = outgoing.body().and_then(|b| b.as_bytes()).unwrap();

        assert_eq!(body, b"<note><to>Tove</to></note>");
        assert_eq!(header_str(&outgoing, "content-type"), CONTENT_TYPE_XML);
        assert_eq!(header_str(&outgoing, "content-length"), body.len().to_string());
    }

    #[test]
    fn test_new_body_replaces_content_type() {
        let request = client("https://api.example.com")
            .post()
            .json(&BTreeMap::from([("a", 1)]))
            .raw_body("plain bytes");
        let outgoing = assembled(&request);

        assert!(outgoing.headers().get(CONTENT_TYPE).is_none());
        assert!(outgoing.headers().get(CONTENT_LENGTH).is_none());
        assert_eq!(outgoing.body().and_then(|b| b.as_bytes()), Some(&b"plain bytes"[..]));
    }

    #[test]
    fn test_raw_body_keeps_explicit_content_type() {
        let request = client("https://api.example.com")
            .post()
            .header("Content-Type", "text/csv")
            .json(&BTreeMap::from([("a", 1)]))
            .raw_body("a,b");

        assert_eq!(header_str(&assembled(&request), "content-type"), "text/csv");
    }

    #[test]
    fn test_url_encoded_params_take_precedence() {
        let request = client("https://api.example.com")
            .post()
            .json(&BTreeMap::from([("ignored", true)]))
            .url_encoded_param("name", "sendy")
            .url_encoded_param("lang", "rust & go");
        let outgoing = assembled(&request);

        assert_eq!(
            header_str(&outgoing, "content-type"),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(
            outgoing.body().and_then(|b| b.as_bytes()),
            Some(&b"lang=rust+%26+go&name=sendy"[..])
        );
    }

    #[test]
    fn test_headers_use_set_semantics() {
        let request = client("https://api.example.com")
            .get()
            .header("X-Trace", "first")
            .header("x-trace", "second")
            .user_agent("agent/2");
        let outgoing = assembled(&request);

        let traces: Vec<_> = outgoing.headers().get_all("x-trace").iter().collect();
        assert_eq!(traces, vec!["second"]);
        assert_eq!(header_str(&outgoing, "user-agent"), "agent/2");
    }

    #[test]
    fn test_body_content_type_replaces_earlier_header() {
        let request = client("https://api.example.com")
            .post()
            .header("Content-Type", "text/plain")
            .json(&BTreeMap::from([("a", 1)]));

        assert_eq!(header_str(&assembled(&request), "content-type"), "application/json");
    }

    #[test]
    fn test_header_after_body_wins() {
        let request = client("https://api.example.com")
            .post()
            .json(&BTreeMap::from([("a", 1)]))
            .header("Content-Type", "application/vnd.api+json");

        assert_eq!(
            header_str(&assembled(&request), "content-type"),
            "application/vnd.api+json"
        );
    }

    #[test]
    fn test_form_overrides_content_type_header() {
        let request = Client::bare()
            .host("https://api.example.com")
            .post()
            .header("Content-Type", "text/plain")
            .json(&BTreeMap::from([("a", 1)]))
            .header("Content-Length", "999")
            .url_encoded_param("a", "b");
        let outgoing = assembled(&request);

        assert_eq!(
            header_str(&outgoing, "content-type"),
            "application/x-www-form-urlencoded"
        );
        assert_eq!(header_str(&outgoing, "content-length"), "3");
        assert_eq!(outgoing.body().and_then(|b| b.as_bytes()), Some(&b"a=b"[..]));
    }

    #[test]
    fn test_basic_auth_applied_when_either_half_set() {
        let request = client("https://api.example.com").get().basic_auth("aladdin", "opensesame");
        let outgoing = assembled(&request);
        let value = &outgoing.headers()[AUTHORIZATION];
        assert_eq!(value.to_str().unwrap(), "Basic YWxhZGRpbjpvcGVuc2VzYW1l");
        assert!(value.is_sensitive());

        let request = client("https://api.example.com").get().basic_auth("", "");
        assert!(assembled(&request).headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_client_snapshot_is_isolated() {
        let base = client("https://one.example.com").header("X-Version", "1");
        let request = base.get();
        let _changed = base.clone().host("https://two.example.com").header("X-Version", "2");

        let outgoing = assembled(&request);
        assert_eq!(outgoing.url().host_str(), Some("one.example.com"));
        assert_eq!(header_str(&outgoing, "x-version"), "1");
    }

    #[test]
    fn test_invalid_header_name_is_build_error() {
        let request = client("https://api.example.com").get().header("bad header", "x");
        assert!(matches!(
            request.assemble(),
            Err(BuildError::InvalidHeaderName(name)) if name == "bad header"
        ));
    }

    #[test]
    fn test_per_attempt_timeout_is_applied() {
        let request = Client::bare()
            .host("https://api.example.com")
            .with_retries_and_timeout(2, Duration::from_secs(4))
            .get();
        assert_eq!(assembled(&request).timeout(), Some(&Duration::from_secs(4)));
    }

    #[test]
    fn test_multipart_form_sets_boundary() {
        let request = client("https://api.example.com").post().multipart_form(vec![
            FormEntry::named("file", "hello.txt", Cursor::new(b"file body".to_vec())),
            FormEntry::field("title", "greeting"),
        ]);
        let outgoing = assembled(&request);

        let content_type = header_str(&outgoing, "content-type");
        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .expect("multipart content type");
        let body = String::from_utf8(outgoing.body().and_then(|b| b.as_bytes()).unwrap().to_vec()).unwrap();

        assert!(body.contains(&format!("--{boundary}\r\n")));
        assert!(body.contains("name=\"file\"; filename=\"hello.txt\""));
        assert!(body.contains("Content-Disposition: form-data; name=\"title\"\r\n\r\ngreeting"));
        assert!(body.ends_with(&format!("--{boundary}--\r\n")));
    }

    // ------------------------------------------------------------------
    // Sticky errors
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_error_is_sticky_through_builder_and_send() {
        let request = client("https://api.example.com")
            .post()
            .json(&Unserializable)
            .path("/changed")
            .param("a", "b")
            .header("X-After", "1")
            .json(&BTreeMap::from([("id", 1)]))
            .raw_body("later");

        assert!(request.path.is_empty());
        assert!(request.params.is_empty());
        assert!(request.body.is_none());

        let err = request.send().await.error().unwrap_err();
        match err {
            Error::Build(BuildError::Json(e)) => assert!(e.to_string().contains("refusing to serialize")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_failed_encode_leaves_prior_body() {
        let request = client("https://api.example.com")
            .post()
            .raw_body("kept")
            .xml(&Unserializable);

        assert!(matches!(request.stored_error(), Some(Error::Build(BuildError::Xml(_)))));
        assert_eq!(&request.body.as_ref().unwrap()[..], b"kept");
    }

    #[tokio::test]
    async fn test_malformed_host_surfaces_on_send() {
        let response = client("not a url").get().path("/x").send().await;
        assert_eq!(response.status_code(), -1);
        assert!(matches!(
            response.error(),
            Err(Error::Build(BuildError::InvalidUrl { .. }))
        ));
    }

    // ------------------------------------------------------------------
    // End to end
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_get_decodes_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/todos/1"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"userId":1,"id":1,"title":"delectus aut autem","completed":false}"#,
                "application/json",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let mut todo = TestTodoObject::default();
        let result = client(&server.uri())
            .get()
            .path("/todos/1")
            .send()
            .await
            .json(&mut todo)
            .error();

        assert!(result.is_ok());
        assert_eq!(todo.user_id, 1);
        assert_eq!(todo.title, "delectus aut autem");
    }

    #[tokio::test]
    async fn test_post_json_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/posts"))
            .and(header("content-type", "application/json"))
            .and(header("content-length", "10"))
            .and(body_string(r#"{"id":101}"#))
            .respond_with(ResponseTemplate::new(201).set_body_raw(r#"{"id":101}"#, "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let mut post = TestPostObject::default();
        let result = client(&server.uri())
            .post()
            .path("/posts")
            .json(&BTreeMap::from([("id", 101)]))
            .send()
            .await
            .json(&mut post)
            .error();

        assert!(result.is_ok());
        assert_eq!(post.id, 101);
    }

    #[tokio::test]
    async fn test_query_params_reach_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "rust lang"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server.uri())
            .get()
            .path("/search")
            .param("q", "rust lang")
            .send()
            .await;

        assert_eq!(response.status_code(), 200);
        assert!(response.error().is_ok());
    }

    #[tokio::test]
    async fn test_not_found_is_status_error_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
            .expect(1)
            .mount(&server)
            .await;

        let response = Client::bare()
            .host(server.uri())
            .retry_policy(RetryPolicy::new(3, Duration::from_secs(2)).with_base_delay(Duration::from_millis(1)))
            .get()
            .path("/missing")
            .send()
            .await;

        assert_eq!(response.status_code(), 404);
        assert_eq!(response.text(), "nope");
        assert_eq!(response.error().unwrap_err().status(), Some(404));
        // dropping the server verifies the single expected call
    }

    #[tokio::test]
    async fn test_connection_refused_surfaces_after_single_hook_run() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let hook_calls = Arc::new(Mutex::new(0));
        let counter = hook_calls.clone();

        let response = Client::bare()
            .host(format!("http://{addr}"))
            .retry_policy(RetryPolicy::new(2, Duration::from_secs(2)).with_base_delay(Duration::from_millis(1)))
            .hook(move |_: &mut reqwest::Request| *counter.lock().unwrap() += 1)
            .get()
            .send()
            .await;

        assert_eq!(response.status_code(), -1);
        let err = response.error().unwrap_err();
        assert!(matches!(&err, Error::Transport(e) if e.is_connect()));
        // hooks run once per send, not once per attempt
        assert_eq!(*hook_calls.lock().unwrap(), 1);
    }

    /// Accepts connections and closes each one with the request still
    /// unread, which makes the peer see a reset.
    async fn resetting_server() -> (String, Arc<AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    socket.readable().await.unwrap();
                    drop(socket);
                });
            }
        });

        (format!("http://{addr}"), accepted)
    }

    #[tokio::test]
    async fn test_connection_reset_is_retried() {
        let (host, accepted) = resetting_server().await;

        let response = Client::bare()
            .host(host)
            .retry_policy(RetryPolicy::new(2, Duration::from_secs(2)).with_base_delay(Duration::from_millis(1)))
            .post()
            .path("/reset")
            .json(&BTreeMap::from([("id", 1)]))
            .send()
            .await;

        assert_eq!(response.status_code(), -1);
        assert!(matches!(response.error(), Err(Error::Transport(_))));
        // first attempt plus two retries
        assert_eq!(accepted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_hooks_see_assembled_request_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/items/9"))
            .and(header("x-stage", "request"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let client_order = order.clone();
        let request_order = order.clone();

        let response = client(&server.uri())
            .hook(move |r: &mut reqwest::Request| {
                client_order.lock().unwrap().push(format!("client {}", r.url().path()));
                r.headers_mut().insert("x-stage", HeaderValue::from_static("client"));
            })
            .put()
            .path("/items/9")
            .hook(move |r: &mut reqwest::Request| {
                request_order.lock().unwrap().push("request".to_string());
                r.headers_mut().insert("x-stage", HeaderValue::from_static("request"));
            })
            .dump()
            .send()
            .await;

        assert_eq!(response.status_code(), 204);
        assert_eq!(*order.lock().unwrap(), vec!["client /items/9", "request"]);
    }

    #[tokio::test]
    async fn test_multipart_reaches_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server.uri())
            .post()
            .path("/upload")
            .multipart_form(vec![
                FormEntry::named("doc", "a.txt", Cursor::new(b"AAA".to_vec())),
                FormEntry::field("kind", "text"),
            ])
            .send()
            .await;
        assert!(response.error().is_ok());

        let received = server.received_requests().await.unwrap();
        let upload = &received[0];
        let content_type = upload.headers["content-type"].to_str().unwrap();
        let boundary = content_type.strip_prefix("multipart/form-data; boundary=").unwrap();
        let body = String::from_utf8_lossy(&upload.body);

        assert!(body.starts_with(&format!("--{boundary}\r\n")));
        assert!(body.contains("name=\"doc\"; filename=\"a.txt\""));
        assert!(body.contains("name=\"kind\"\r\n\r\ntext"));
    }

    #[tokio::test]
    async fn test_overall_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let response = client(&server.uri())
            .get()
            .timeout(Duration::from_millis(50))
            .send()
            .await;

        let err = response.error().unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_per_attempt_timeout_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .expect(3)
            .mount(&server)
            .await;

        let response = Client::bare()
            .host(server.uri())
            .retry_policy(RetryPolicy::new(2, Duration::from_millis(100)).with_base_delay(Duration::from_millis(1)))
            .get()
            .send()
            .await;

        let err = response.error().unwrap_err();
        assert!(err.is_timeout());
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let response = client(&server.uri()).get().cancel_on(token).send().await;
        assert!(matches!(response.error(), Err(Error::Cancelled)));
    }
}
