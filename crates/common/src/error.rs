//! Common error types for meshprobe components.

use std::fmt;

/// A specialized Result type for meshprobe operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort the daemon before or while it is serving.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to resolve local addresses: {0}")]
    LocalAddress(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{server} server exited unexpectedly")]
    ServerExited { server: String },

    #[error("Unknown error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new local address resolution error.
    pub fn local_address(msg: impl fmt::Display) -> Self {
        Error::LocalAddress(msg.to_string())
    }

    /// Create a new listener bind error.
    pub fn bind(addr: impl fmt::Display, source: std::io::Error) -> Self {
        Error::Bind {
            addr: addr.to_string(),
            source,
        }
    }

    /// A serving task stopped while the daemon was still running.
    pub fn server_exited(server: impl fmt::Display) -> Self {
        Error::ServerExited {
            server: server.to_string(),
        }
    }

    /// Create a new other error.
    pub fn other(msg: impl fmt::Display) -> Self {
        Error::Other(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_message() {
        let err = Error::bind(
            "0.0.0.0:8080",
            std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        );
        assert_eq!(
            err.to_string(),
            "Failed to bind 0.0.0.0:8080: address in use"
        );
    }

    #[test]
    fn test_local_address_error_message() {
        let err = Error::local_address("no interfaces");
        assert!(matches!(err, Error::LocalAddress(_)));
        assert_eq!(
            err.to_string(),
            "Failed to resolve local addresses: no interfaces"
        );
    }

    #[test]
    fn test_server_exited_message() {
        let err = Error::server_exited("liveness");
        assert!(matches!(err, Error::ServerExited { .. }));
        assert_eq!(err.to_string(), "liveness server exited unexpectedly");
    }
}
