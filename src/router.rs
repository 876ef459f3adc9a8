//! Radix-tree request router.
//!
//! One tree per HTTP method, plus the middleware stack every request passes
//! through. The router also remembers which template matched so middleware
//! can name a request by its route instead of its raw path.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// A registered route: the template as the user wrote it plus its handler.
#[derive(Clone)]
struct Endpoint {
    template: Arc<str>,
    handler: BoxedHandler,
}

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Every builder method returns `self` so registrations chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Endpoint>>,
    middleware: Arc<[Arc<dyn Middleware>]>,
    not_found: BoxedHandler,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            middleware: Arc::new([]),
            not_found: not_found.into_boxed_handler(),
        }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Parameters may be written `:name` / `*name` or `{name}` / `{*name}`;
    /// [`Request::route`] reports the template verbatim either way.
    ///
    /// ```rust
    /// # use http::Method;
    /// # use tsu_sentry::{Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/users/:id", get_user)
    ///     .on(Method::POST, "/users",     create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the template is malformed or conflicts with one already
    /// registered for the same method.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        let endpoint = Endpoint { template: Arc::from(path), handler: handler.into_boxed_handler() };
        self.routes
            .entry(method)
            .or_default()
            .insert(matchit_template(path), endpoint)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Appends a middleware. The first one added is the outermost.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        let mut stack = self.middleware.to_vec();
        stack.push(Arc::new(middleware));
        self.middleware = stack.into();
        self
    }

    /// Routes one request through the middleware stack to its endpoint.
    ///
    /// Requests that match no route still run every middleware and end at a
    /// `404 Not Found` endpoint.
    pub async fn dispatch(&self, mut req: Request) -> Response {
        let endpoint = match self.lookup(&req) {
            Some((endpoint, params)) => {
                req.params = params;
                req.route = Some(endpoint.template);
                endpoint.handler
            }
            None => Arc::clone(&self.not_found),
        };
        Next::new(Arc::clone(&self.middleware), endpoint).run(req).await
    }

    fn lookup(&self, req: &Request) -> Option<(Endpoint, HashMap<String, String>)> {
        let tree = self.routes.get(req.method())?;
        let matched = tree.at(req.path()).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value.clone(), params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

async fn not_found(_req: Request) -> Response {
    Response::status(StatusCode::NOT_FOUND)
}

/// Rewrites `:name` and `*name` segments into matchit's `{name}` / `{*name}`.
fn matchit_template(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{name}}}")
            } else if let Some(name) = segment.strip_prefix('*') {
                format!("{{*{name}}}")
            } else {
                segment.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colon_params_become_braces() {
        assert_eq!(matchit_template("/users/:id"), "/users/{id}");
        assert_eq!(matchit_template("/users/:id/posts/:post"), "/users/{id}/posts/{post}");
        assert_eq!(matchit_template("/static/*path"), "/static/{*path}");
    }

    #[test]
    fn brace_and_plain_templates_pass_through() {
        assert_eq!(matchit_template("/users/{id}"), "/users/{id}");
        assert_eq!(matchit_template("/"), "/");
        assert_eq!(matchit_template("/healthz"), "/healthz");
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_routes_panic() {
        async fn h(_: Request) -> Response { Response::text("") }
        let _ = Router::new().get("/users/:id", h).get("/users/:name", h);
    }
}
