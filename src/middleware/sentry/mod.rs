//! Sentry request instrumentation.
//!
//! [`Sentry`] gives every request its own [`Hub`], wraps the request in an
//! `http.server` transaction, and reports panics from downstream handlers.
//!
//! ```rust,no_run
//! use tsu_sentry::middleware::sentry::{Options, Sentry};
//! use tsu_sentry::{Request, Response, Router, Server};
//!
//! # async fn get_user(_: Request) -> Response { Response::text("") }
//! #[tokio::main]
//! async fn main() {
//!     // sentry::init(...) binds the process hub before any request arrives.
//!     let app = Router::new()
//!         .get("/users/:id", get_user)
//!         .layer(Sentry::new(Options::default().repanic(true)));
//!
//!     Server::bind(([0, 0, 0, 0], 3000)).serve(app).await.unwrap();
//! }
//! ```
//!
//! Handlers reach the per-request hub through [`hub_from_request`], or simply
//! through `Hub::current()`, since the hub is bound to the handler future.

use std::any::Any;
use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use http::StatusCode;
use sentry_core::protocol::{self, Event, SpanStatus};
use sentry_core::{Hub, SentryFutureExt, Transaction, TransactionContext, TransactionOrSpan};
use tracing::{debug, warn};

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

pub(crate) mod recover;
mod status;

pub use recover::{classify, decide, is_broken_pipe, PanicKind, Recovery};
pub use status::span_status;

/// Reported as the SDK name on every event captured through this middleware.
pub const SDK_IDENTIFIER: &str = "sentry.rust.tsu";

/// Operation name of the per-request transaction.
pub const OPERATION: &str = "http.server";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for [`Sentry`].
///
/// ```rust
/// use std::time::Duration;
/// use tsu_sentry::middleware::sentry::Options;
///
/// let options = Options::default()
///     .repanic(true)
///     .wait_for_delivery(true)
///     .timeout(Duration::from_secs(5));
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Options {
    /// Re-raise a panic after it has been reported. Set this when an outer
    /// layer (the server's own guard, or another middleware) is expected to
    /// turn the panic into a response.
    pub repanic: bool,
    /// Hold the request until the panic event is flushed, bounded by
    /// `timeout`.
    pub wait_for_delivery: bool,
    /// Upper bound on the delivery wait. Zero means the 2 s default.
    pub timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self { repanic: false, wait_for_delivery: false, timeout: DEFAULT_TIMEOUT }
    }
}

impl Options {
    pub fn repanic(mut self, repanic: bool) -> Self {
        self.repanic = repanic;
        self
    }

    pub fn wait_for_delivery(mut self, wait: bool) -> Self {
        self.wait_for_delivery = wait;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Where a transaction name came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransactionSource {
    /// The matched route template, e.g. `GET /users/:id`.
    Route,
    /// The raw request path; no route matched.
    Url,
}

impl TransactionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::Url => "url",
        }
    }
}

/// The Sentry middleware. Register it with [`Router::layer`](crate::Router::layer).
#[derive(Clone, Copy, Debug, Default)]
pub struct Sentry {
    options: Options,
}

impl Sentry {
    pub fn new(mut options: Options) -> Self {
        if options.timeout.is_zero() {
            options.timeout = DEFAULT_TIMEOUT;
        }
        Self { options }
    }

    pub fn options(&self) -> Options {
        self.options
    }
}

impl Middleware for Sentry {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        Box::pin(instrument(self.options, req, next))
    }
}

/// The per-request hub, if a [`Sentry`] middleware (or anything else) put one
/// on the request.
pub fn hub_from_request(req: &Request) -> Option<Arc<Hub>> {
    req.extensions().get::<Arc<Hub>>().cloned()
}

/// The request's `http.server` transaction, for starting child spans.
pub fn transaction_from_request(req: &Request) -> Option<TransactionOrSpan> {
    req.extensions().get::<TransactionOrSpan>().cloned()
}

/// Transaction name and source: the route template when one matched,
/// otherwise the raw path.
pub fn transaction_name(req: &Request) -> (String, TransactionSource) {
    match req.route() {
        Some(route) => (format!("{} {route}", req.method()), TransactionSource::Route),
        None => (format!("{} {}", req.method(), req.path()), TransactionSource::Url),
    }
}

async fn instrument(options: Options, mut req: Request, next: Next) -> Response {
    let hub = match hub_from_request(&req) {
        Some(hub) => hub,
        None => {
            let hub = Arc::new(Hub::new_from_top(Hub::current()));
            req.extensions_mut().insert(Arc::clone(&hub));
            debug!("cloned process hub for request");
            hub
        }
    };

    let (name, source) = transaction_name(&req);
    let headers = req.headers().iter()
        .filter_map(|(k, v)| Some((k.as_str(), v.to_str().ok()?)));
    let ctx = TransactionContext::continue_from_headers(&name, OPERATION, headers);
    let transaction = hub.start_transaction(ctx);
    transaction.set_data("source", source.as_str().into());

    let sentry_req = sentry_request(&req);
    transaction.set_request(sentry_req.clone());
    req.extensions_mut().insert(TransactionOrSpan::from(transaction.clone()));

    let guard = FinishGuard(Some(transaction.clone()));
    // Request data and span live in a scope of their own, popped before the
    // transaction finishes, so a reused hub never keeps a stale request.
    let scope = hub.push_scope();
    bind_scope(&hub, &transaction, sentry_req.clone());

    let outcome = AssertUnwindSafe(next.run(req))
        .catch_unwind()
        .bind_hub(Arc::clone(&hub))
        .await;

    let (response, repanic) = match outcome {
        Ok(response) => (response, None),
        Err(payload) => recover(options, &hub, sentry_req, payload).await,
    };

    drop(scope);
    guard.finish(span_status(response.status_code()));

    if let Some(payload) = repanic {
        panic::resume_unwind(payload);
    }
    response
}

/// Tags the SDK name, sets the current request on every event from this
/// hub's top scope, and makes the transaction the scope's active span.
fn bind_scope(hub: &Hub, transaction: &Transaction, sentry_req: protocol::Request) {
    let tag_sdk = hub.client().is_some();
    hub.configure_scope(|scope| {
        scope.set_span(Some(transaction.clone().into()));
        scope.add_event_processor(move |mut event: Event<'static>| {
            event.request = Some(sentry_req.clone());
            if tag_sdk {
                if let Some(sdk) = event.sdk.as_mut() {
                    sdk.to_mut().name = SDK_IDENTIFIER.to_owned();
                }
            }
            Some(event)
        });
    });
}

/// Handles a caught panic. Returns the response to answer with and, when the
/// panic must keep unwinding, its payload.
async fn recover(
    options: Options,
    hub: &Arc<Hub>,
    sentry_req: protocol::Request,
    payload: Box<dyn Any + Send>,
) -> (Response, Option<Box<dyn Any + Send>>) {
    let kind = classify(payload.as_ref());
    let recovery = decide(kind, options.repanic);

    if recovery.reports() {
        let mut event = recover::panic_event(payload.as_ref());
        event.request = Some(sentry_req);
        let event_id = hub.capture_event(event);
        if !event_id.is_nil() && options.wait_for_delivery {
            flush(hub, options.timeout).await;
        }
    } else {
        debug!("client disconnected mid-response, not reporting panic");
    }

    let response = Response::status(StatusCode::INTERNAL_SERVER_ERROR);
    if recovery.propagates() {
        (response, Some(payload))
    } else {
        warn!(panic = %recover::panic_message(payload.as_ref()), "absorbed panic in request handler");
        (response, None)
    }
}

/// Waits for queued events, at most `timeout`, off the async worker threads.
async fn flush(hub: &Hub, timeout: Duration) {
    let Some(client) = hub.client() else { return };
    match tokio::task::spawn_blocking(move || client.flush(Some(timeout))).await {
        Ok(true) => debug!("flushed sentry events"),
        Ok(false) => warn!(?timeout, "timed out flushing sentry events"),
        Err(e) => warn!("sentry flush task failed: {e}"),
    }
}

/// Finishes the transaction exactly once. If the request future is dropped
/// before the response is ready, the transaction is finished as cancelled.
struct FinishGuard(Option<Transaction>);

impl FinishGuard {
    fn finish(mut self, status: SpanStatus) {
        if let Some(transaction) = self.0.take() {
            transaction.set_status(status);
            transaction.finish();
        }
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if let Some(transaction) = self.0.take() {
            transaction.set_status(SpanStatus::Cancelled);
            transaction.finish();
        }
    }
}

/// Converts the request head into Sentry's request interface.
fn sentry_request(req: &Request) -> protocol::Request {
    let host = req.header("host")
        .map(Cow::Borrowed)
        .or_else(|| req.uri().authority().map(|a| Cow::Owned(a.to_string())));
    let url = host.and_then(|host| {
        let scheme = req.uri().scheme_str().unwrap_or("http");
        format!("{scheme}://{host}{}", req.path()).parse().ok()
    });

    protocol::Request {
        url,
        method: Some(req.method().to_string()),
        query_string: req.uri().query().map(str::to_owned),
        headers: req.headers().iter()
            .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_owned())))
            .collect(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request {
        http::Request::get(uri)
            .header("host", "example.com")
            .header("x-trace", "abc")
            .body(bytes::Bytes::new())
            .unwrap()
            .into()
    }

    #[test]
    fn zero_timeout_becomes_default() {
        let sentry = Sentry::new(Options::default().timeout(Duration::ZERO));
        assert_eq!(sentry.options().timeout, Duration::from_secs(2));

        let sentry = Sentry::new(Options::default().timeout(Duration::from_millis(300)));
        assert_eq!(sentry.options().timeout, Duration::from_millis(300));
    }

    #[test]
    fn default_options() {
        let options = Sentry::default().options();
        assert!(!options.repanic);
        assert!(!options.wait_for_delivery);
        assert_eq!(options.timeout, Duration::from_secs(2));
    }

    #[test]
    fn name_from_route_template() {
        let mut req = request("/users/42");
        req.route = Some(Arc::from("/users/:id"));

        let (name, source) = transaction_name(&req);
        assert_eq!(name, "GET /users/:id");
        assert_eq!(source, TransactionSource::Route);
    }

    #[test]
    fn name_from_raw_path() {
        let (name, source) = transaction_name(&request("/unknown/42?x=1"));
        assert_eq!(name, "GET /unknown/42");
        assert_eq!(source, TransactionSource::Url);
        assert_eq!(source.as_str(), "url");
    }

    #[test]
    fn lookup_on_bare_request_is_none() {
        let req = request("/");
        assert!(hub_from_request(&req).is_none());
        assert!(transaction_from_request(&req).is_none());
    }

    #[test]
    fn lookup_returns_attached_hub() {
        let mut req = request("/");
        let hub = Arc::new(Hub::new_from_top(Hub::current()));
        req.extensions_mut().insert(Arc::clone(&hub));

        let found = hub_from_request(&req).unwrap();
        assert!(Arc::ptr_eq(&found, &hub));
    }

    #[test]
    fn sentry_request_from_head() {
        let req = sentry_request(&request("/users/42?verbose=1"));

        assert_eq!(req.method.as_deref(), Some("GET"));
        assert_eq!(req.url.unwrap().as_str(), "http://example.com/users/42");
        assert_eq!(req.query_string.as_deref(), Some("verbose=1"));
        assert_eq!(req.headers.get("x-trace").map(String::as_str), Some("abc"));
    }
}
