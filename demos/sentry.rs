//! Sentry middleware demo.
//!
//! Run with:
//!   SENTRY_DSN=https://key@o0.ingest.sentry.io/0 RUST_LOG=debug cargo run --example sentry
//!
//! Try:
//!   curl http://localhost:3000/users/42   # transaction "GET /users/:id"
//!   curl http://localhost:3000/nope       # transaction "GET /nope", 404
//!   curl http://localhost:3000/panic      # panic event, then 500

use std::time::Duration;

use tsu_sentry::middleware::sentry::{self, Options, Sentry};
use tsu_sentry::{Request, Response, Router, Server};

fn main() {
    tracing_subscriber::fmt::init();

    // Without a DSN the client is disabled and the middleware captures nothing.
    let _guard = ::sentry::init(::sentry::ClientOptions {
        dsn: std::env::var("SENTRY_DSN").ok().and_then(|dsn| dsn.parse().ok()),
        traces_sample_rate: 1.0,
        ..Default::default()
    });

    let app = Router::new()
        .get("/users/:id", get_user)
        .get("/panic", explode)
        .layer(Sentry::new(
            Options::default()
                .repanic(true)
                .wait_for_delivery(true)
                .timeout(Duration::from_secs(3)),
        ));

    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    rt.block_on(async {
        Server::bind(([0, 0, 0, 0], 3000))
            .serve(app)
            .await
            .expect("server error");
    });
}

// GET /users/:id
async fn get_user(req: Request) -> Response {
    if let Some(tx) = sentry::transaction_from_request(&req) {
        let span = tx.start_child("db.query", "SELECT * FROM users WHERE id = $1");
        tokio::time::sleep(Duration::from_millis(5)).await;
        span.finish();
    }
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#).into_bytes())
}

// GET /panic: reported by the middleware, re-raised, then answered with 500
// by the server's own guard.
async fn explode(_req: Request) -> Response {
    let user: Option<&str> = None;
    Response::text(user.expect("no user in session"))
}
