//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use sentry_core::protocol::{Context, Envelope, EnvelopeItem, Event, SpanStatus, Transaction};
use sentry_core::{Client, ClientOptions, Hub, Transport};
use tsu_sentry::Request;

/// Runs `f` on a current-thread runtime with a capturing Sentry client bound
/// to the thread's hub, and returns everything the client would have sent.
pub fn capture<F, Fut>(f: F) -> Vec<Envelope>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let options = ClientOptions { traces_sample_rate: 1.0, ..Default::default() };
    sentry_core::test::with_captured_envelopes_options(
        || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
                .block_on(f())
        },
        options,
    )
}

pub fn events(envelopes: &[Envelope]) -> Vec<&Event<'static>> {
    envelopes.iter().filter_map(Envelope::event).collect()
}

pub fn transactions(envelopes: &[Envelope]) -> Vec<&Transaction<'static>> {
    envelopes.iter()
        .flat_map(Envelope::items)
        .filter_map(|item| match item {
            EnvelopeItem::Transaction(tx) => Some(tx),
            _ => None,
        })
        .collect()
}

pub fn trace_status(tx: &Transaction<'static>) -> Option<SpanStatus> {
    match tx.contexts.get("trace") {
        Some(Context::Trace(trace)) => trace.status.clone(),
        _ => None,
    }
}

pub fn trace_source(tx: &Transaction<'static>) -> Option<String> {
    tx.extra.get("source").and_then(|v| v.as_str()).map(str::to_owned)
}

/// Transport that keeps what it is sent and records each flush. A flush takes
/// `delay`, cut short by the timeout it is given.
pub struct RecordingTransport {
    pub envelopes: Mutex<Vec<Envelope>>,
    pub flushes: Mutex<Vec<Duration>>,
    delay: Duration,
}

impl RecordingTransport {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            envelopes: Mutex::default(),
            flushes: Mutex::default(),
            delay,
        })
    }

    pub fn events(&self) -> usize {
        self.envelopes.lock().unwrap().iter().filter(|e| e.event().is_some()).count()
    }

    pub fn flushes(&self) -> Vec<Duration> {
        self.flushes.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn send_envelope(&self, envelope: Envelope) {
        self.envelopes.lock().unwrap().push(envelope);
    }

    fn flush(&self, timeout: Duration) -> bool {
        self.flushes.lock().unwrap().push(timeout);
        std::thread::sleep(self.delay.min(timeout));
        self.delay <= timeout
    }

    fn shutdown(&self, _timeout: Duration) -> bool {
        true
    }
}

/// Like [`capture`], but with `transport` behind an enabled client built from
/// `options`.
pub fn with_transport<F, Fut>(transport: &Arc<RecordingTransport>, options: ClientOptions, f: F)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let options = ClientOptions {
        dsn: Some("https://public@sentry.invalid/1".parse().unwrap()),
        transport: Some(Arc::new(Arc::clone(transport))),
        ..options
    };
    let hub = Arc::new(Hub::new(Some(Arc::new(Client::from(options))), Arc::default()));
    Hub::run(hub, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f())
    });
}

pub fn get(uri: &str) -> Request {
    http::Request::get(uri)
        .header("host", "api.test")
        .body(Bytes::new())
        .unwrap()
        .into()
}
