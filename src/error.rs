//! Server error type.

use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Returned by [`Server::serve`](crate::Server::serve).
///
/// Handler failures are HTTP [`Response`](crate::Response) values and handler
/// panics belong to the Sentry middleware; this type only covers failures of
/// the server itself.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The listening socket could not be bound.
    Bind { addr: SocketAddr, source: io::Error },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind { addr, source } => write!(f, "bind {addr}: {source}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_names_the_address() {
        let err = Error::Bind {
            addr: ([127, 0, 0, 1], 80).into(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };

        assert!(err.to_string().starts_with("bind 127.0.0.1:80: "));
        assert!(std::error::Error::source(&err).is_some());
    }
}
