//! HTTP status code to span status.

use http::StatusCode;
use sentry_core::protocol::SpanStatus;

/// Maps a response status onto the span status Sentry expects on an
/// `http.server` transaction.
///
/// Anything below 400 is `Ok`. Codes outside 100-599 never reach here since
/// [`StatusCode`] rejects them; 6xx-9xx extension codes map to `UnknownError`.
pub fn span_status(status: StatusCode) -> SpanStatus {
    match status.as_u16() {
        0..=399 => SpanStatus::Ok,
        401 => SpanStatus::Unauthenticated,
        403 => SpanStatus::PermissionDenied,
        404 => SpanStatus::NotFound,
        409 => SpanStatus::AlreadyExists,
        413 => SpanStatus::FailedPrecondition,
        429 => SpanStatus::ResourceExhausted,
        400..=499 => SpanStatus::InvalidArgument,
        501 => SpanStatus::Unimplemented,
        503 => SpanStatus::Unavailable,
        504 => SpanStatus::DeadlineExceeded,
        500..=599 => SpanStatus::InternalError,
        _ => SpanStatus::UnknownError,
    }
}
