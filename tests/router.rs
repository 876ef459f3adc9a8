mod common;

use std::sync::{Arc, Mutex};

use http::StatusCode;
use tsu_sentry::middleware::{Middleware, Next};
use tsu_sentry::{BoxFuture, Request, Response, Router};

use common::get;

async fn show_route(req: Request) -> Response {
    let route = req.route().unwrap_or("-").to_owned();
    let id = req.param("id").unwrap_or("-").to_owned();
    Response::text(format!("{route} {id}"))
}

/// Appends its name to a shared log on the way in and on the way out.
struct Record {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Middleware for Record {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let name = self.name;
        let log = Arc::clone(&self.log);
        Box::pin(async move {
            log.lock().unwrap().push(format!("{name} in"));
            let res = next.run(req).await;
            log.lock().unwrap().push(format!("{name} out"));
            res
        })
    }
}

#[tokio::test]
async fn colon_template_matches_and_is_reported_verbatim() {
    let router = Router::new().get("/users/:id", show_route);

    let res = router.dispatch(get("/users/42")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body(), b"/users/:id 42");
}

#[tokio::test]
async fn brace_template_matches_too() {
    let router = Router::new().get("/users/{id}", show_route);

    let res = router.dispatch(get("/users/7")).await;
    assert_eq!(res.body(), b"/users/{id} 7");
}

#[tokio::test]
async fn wrong_method_is_not_found() {
    let router = Router::new().post("/users/:id", show_route);

    let res = router.dispatch(get("/users/7")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn middleware_runs_outermost_first() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .get("/", show_route)
        .layer(Record { name: "a", log: Arc::clone(&log) })
        .layer(Record { name: "b", log: Arc::clone(&log) });

    router.dispatch(get("/")).await;

    assert_eq!(*log.lock().unwrap(), ["a in", "b in", "b out", "a out"]);
}

#[tokio::test]
async fn middleware_wraps_unmatched_requests() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .get("/", show_route)
        .layer(Record { name: "a", log: Arc::clone(&log) });

    let res = router.dispatch(get("/nowhere")).await;

    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(*log.lock().unwrap(), ["a in", "a out"]);
}
