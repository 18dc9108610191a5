//! Pre-send hooks.
//!
//! A hook sees the fully assembled outgoing request right before it goes on
//! the wire and may mutate it. Hooks run synchronously, client hooks first,
//! each group in registration order.

use reqwest::header::HOST;
use std::sync::Arc;
use tracing::info;

/// Callback invoked right before a request is transmitted.
pub trait Hook: Send + Sync {
    /// Inspect or mutate the outgoing request.
    fn on_request(&self, request: &mut reqwest::Request);
}

impl<F> Hook for F
where
    F: Fn(&mut reqwest::Request) + Send + Sync,
{
    fn on_request(&self, request: &mut reqwest::Request) {
        self(request)
    }
}

/// Ordered collection of hooks, cheap to clone.
#[derive(Clone, Default)]
pub struct Hooks(Vec<Arc<dyn Hook>>);

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("hook_count", &self.0.len())
            .finish()
    }
}

impl Hooks {
    /// Append a hook.
    pub fn push(&mut self, hook: impl Hook + 'static) {
        self.0.push(Arc::new(hook));
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no hook is registered.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Run every hook in registration order.
    pub fn run(&self, request: &mut reqwest::Request) {
        for hook in &self.0 {
            hook.on_request(request);
        }
    }
}

/// Hook that logs the full wire-format contents of every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct DumpRequest;

impl Hook for DumpRequest {
    fn on_request(&self, request: &mut reqwest::Request) {
        info!(target: "sendy::dump", "\n{}\n", dump_request(request));
    }
}

/// Render a request the way it would appear on an HTTP/1.1 connection.
///
/// Binary bodies are rendered lossily; streaming bodies are omitted.
pub fn dump_request(request: &reqwest::Request) -> String {
    let url = request.url();
    let mut target = url.path().to_string();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let mut out = format!("{} {} HTTP/1.1\r\n", request.method(), target);

    if !request.headers().contains_key(HOST) {
        if let Some(host) = url.host_str() {
            let host = match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
            out.push_str(&format!("Host: {host}\r\n"));
        }
    }

    for (name, value) in request.headers() {
        let value = if value.is_sensitive() {
            "<redacted>".into()
        } else {
            String::from_utf8_lossy(value.as_bytes())
        };
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str("\r\n");

    if let Some(bytes) = request.body().and_then(|body| body.as_bytes()) {
        out.push_str(&String::from_utf8_lossy(bytes));
    }

    out
}
