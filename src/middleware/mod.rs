//! Middleware layer.
//!
//! Middleware wraps every request the router dispatches, matched or not, and
//! is the place for cross-cutting concerns. A middleware receives the request
//! and a [`Next`] handle; calling [`Next::run`] hands the request to the rest
//! of the chain and resolves to its response.
//!
//! ```rust
//! use tsu_sentry::middleware::{Middleware, Next};
//! use tsu_sentry::{BoxFuture, Request};
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn handle(&self, req: Request, next: Next) -> BoxFuture {
//!         Box::pin(async move {
//!             let started = std::time::Instant::now();
//!             let res = next.run(req).await;
//!             tracing::debug!(elapsed = ?started.elapsed(), "request done");
//!             res
//!         })
//!     }
//! }
//! ```
//!
//! Built-in middleware:
//! - [`sentry`]: per-request Sentry hub, `http.server` transaction, panic capture

use std::sync::Arc;

use crate::handler::{BoxFuture, BoxedHandler};
use crate::request::Request;
use crate::response::Response;

pub mod sentry;

/// A request interceptor registered with [`Router::layer`](crate::Router::layer).
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

/// The remainder of a middleware chain: the middleware not yet run, then the
/// endpoint.
pub struct Next {
    stack: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    endpoint: BoxedHandler,
}

impl Next {
    pub(crate) fn new(stack: Arc<[Arc<dyn Middleware>]>, endpoint: BoxedHandler) -> Self {
        Self { stack, index: 0, endpoint }
    }

    /// Runs the rest of the chain.
    pub async fn run(mut self, req: Request) -> Response {
        match self.stack.get(self.index).cloned() {
            Some(middleware) => {
                self.index += 1;
                middleware.handle(req, self).await
            }
            None => self.endpoint.call(req).await,
        }
    }
}
