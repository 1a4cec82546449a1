//! Proxy error types.

use thiserror::Error;

/// Errors that can occur in the forwarding proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The upstream proxy URL could not be parsed at construction.
    #[error("invalid upstream proxy URL: {0}")]
    InvalidUpstream(String),

    /// Binding the local listener failed.
    #[error("failed to bind local proxy listener: {0}")]
    Bind(#[source] std::io::Error),

    /// Dialing the upstream proxy failed.
    #[error("failed to connect to upstream proxy {addr}: {source}")]
    UpstreamDial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The upstream proxy answered the CONNECT handshake with a non-200.
    #[error("upstream proxy CONNECT failed with status: {0}")]
    ConnectRejected(u16),

    /// I/O error on an established connection.
    #[error("proxy I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
