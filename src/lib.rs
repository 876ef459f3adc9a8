//! # tsu-sentry
//!
//! Sentry request instrumentation for a small hyper-based HTTP framework.
//!
//! The [`middleware::sentry::Sentry`] middleware, once layered onto a
//! [`Router`], does three things for every request:
//!
//! - gives the request its own Sentry [`Hub`](sentry_core::Hub), cloned from
//!   the process hub unless the request already carries one,
//! - wraps the request in an `http.server` transaction named after the
//!   matched route (`GET /users/:id`) or, failing that, the raw path,
//!   continuing any incoming `sentry-trace` / `baggage` headers,
//! - catches panics from downstream handlers, reports them (unless the
//!   client merely hung up), and either absorbs them or re-raises them.
//!
//! Delivery, sampling, and batching are entirely `sentry-core`'s job.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tsu_sentry::middleware::sentry::{self, Options, Sentry};
//! use tsu_sentry::{Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Bind a client to the process hub first, e.g. with `sentry::init`.
//!     let app = Router::new()
//!         .get("/users/:id", get_user)
//!         .layer(Sentry::new(Options::default()));
//!
//!     Server::bind(([0, 0, 0, 0], 3000)).serve(app).await.unwrap();
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     if let Some(hub) = sentry::hub_from_request(&req) {
//!         hub.add_breadcrumb(sentry_core::Breadcrumb {
//!             message: Some("loading user".into()),
//!             ..Default::default()
//!         });
//!     }
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;

pub use error::Error;
pub use handler::{BoxFuture, Handler};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
