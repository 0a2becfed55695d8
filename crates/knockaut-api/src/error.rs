use thiserror::Error;

/// Top-level error type for the `knockaut-api` crate.
///
/// Covers every failure mode across the RPC dispatcher, the WebSocket
/// session, and snapshot decoding. The crate performs no local recovery:
/// errors are logged and handed to the caller, which owns retry and user
/// messaging policy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing or resolution error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Non-2xx HTTP response whose body was not a JSON-RPC envelope.
    #[error("HTTP error {status}")]
    Http { status: u16, body: String },

    /// TLS handshake or client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── JSON-RPC ────────────────────────────────────────────────────
    /// The backend answered with an `error` field in the RPC envelope.
    ///
    /// The message is the backend's `error.message` when present,
    /// otherwise the raw error value rendered as JSON.
    #[error("RPC error: {message}")]
    Rpc { message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed or dropped with a protocol error.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// A second listener was registered while one is still active.
    #[error("A session listener is already registered")]
    ListenerConflict,

    /// Reconnection gave up after the attempt ceiling with no listener
    /// or store sink attached to observe the exhaustion.
    #[error("Reconnection exhausted after {attempts} attempts with no observer attached")]
    ReconnectExhausted { attempts: u32 },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying
    /// (retry itself is the caller's responsibility).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::WebSocketConnect(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if the backend rejected the call at the RPC level
    /// (reportable to the user, as opposed to a transport failure).
    pub fn is_rpc(&self) -> bool {
        matches!(self, Self::Rpc { .. })
    }
}
