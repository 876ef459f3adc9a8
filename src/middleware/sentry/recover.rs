//! Panic classification and the report / re-raise decision.
//!
//! Everything here is pure: the middleware catches the unwind, then asks
//! [`classify`] and [`decide`] what to do with the payload.

use std::any::Any;
use std::error::Error as StdError;
use std::io;

use sentry_core::protocol::{Event, Exception, Level, Mechanism};

/// What kind of panic a payload represents.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PanicKind {
    /// The client went away mid-response. Not an application bug.
    Benign,
    /// Anything else: a bug worth an event.
    Reportable,
}

/// The action taken for a recovered panic.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Recovery {
    /// Swallow the panic without reporting it.
    Absorb,
    /// Re-raise without reporting.
    Propagate,
    /// Report, then swallow.
    Report,
    /// Report, then re-raise the original payload.
    ReportAndPropagate,
}

impl Recovery {
    pub fn reports(self) -> bool {
        matches!(self, Self::Report | Self::ReportAndPropagate)
    }

    pub fn propagates(self) -> bool {
        matches!(self, Self::Propagate | Self::ReportAndPropagate)
    }
}

pub fn classify(payload: &(dyn Any + Send)) -> PanicKind {
    if is_broken_pipe(payload) { PanicKind::Benign } else { PanicKind::Reportable }
}

pub fn decide(kind: PanicKind, repanic: bool) -> Recovery {
    match (kind, repanic) {
        (PanicKind::Benign, false) => Recovery::Absorb,
        (PanicKind::Benign, true) => Recovery::Propagate,
        (PanicKind::Reportable, false) => Recovery::Report,
        (PanicKind::Reportable, true) => Recovery::ReportAndPropagate,
    }
}

/// True when the payload is an I/O error caused by the peer hanging up.
///
/// The payload must carry an [`io::Error`], either directly (`panic_any(err)`)
/// or somewhere in the `source()` chain of a boxed error or [`hyper::Error`].
/// String panics never qualify, whatever their text says.
pub fn is_broken_pipe(payload: &(dyn Any + Send)) -> bool {
    if let Some(err) = payload.downcast_ref::<io::Error>() {
        return is_disconnect(err);
    }
    if let Some(err) = payload.downcast_ref::<hyper::Error>() {
        return chain_has_disconnect(err);
    }
    if let Some(err) = payload.downcast_ref::<Box<dyn StdError + Send + Sync>>() {
        return chain_has_disconnect(&**err);
    }
    false
}

fn chain_has_disconnect(err: &(dyn StdError + 'static)) -> bool {
    let mut cur = Some(err);
    while let Some(err) = cur {
        if let Some(io) = err.downcast_ref::<io::Error>() {
            if is_disconnect(io) {
                return true;
            }
        }
        cur = err.source();
    }
    false
}

fn is_disconnect(err: &io::Error) -> bool {
    if matches!(err.kind(), io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset) {
        return true;
    }
    let msg = err.to_string().to_lowercase();
    msg.contains("broken pipe") || msg.contains("connection reset by peer")
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(err) = payload.downcast_ref::<io::Error>() {
        err.to_string()
    } else if let Some(err) = payload.downcast_ref::<Box<dyn StdError + Send + Sync>>() {
        err.to_string()
    } else {
        "Box<dyn Any>".to_owned()
    }
}

/// Builds the fatal, unhandled `panic` exception event for a payload.
pub fn panic_event(payload: &(dyn Any + Send)) -> Event<'static> {
    Event {
        exception: vec![Exception {
            ty: "panic".into(),
            value: Some(panic_message(payload)),
            mechanism: Some(Mechanism {
                ty: "panic".into(),
                handled: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        }]
        .into(),
        level: Level::Fatal,
        ..Default::default()
    }
}
