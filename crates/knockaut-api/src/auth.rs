//! Three-tier authorization store.
//!
//! The backend exposes three independent credential contexts: the remote
//! API ("default"), the dashboard, and the advanced-settings area. Each
//! tier holds at most one Basic token, replaced wholesale whenever
//! credentials are set. No expiry, no local validation — the backend is
//! the sole arbiter of password correctness, surfaced only on failed
//! calls.

use std::sync::RwLock;

use base64::{Engine as _, engine::general_purpose};
use secrecy::{ExposeSecret, SecretString};

/// Which authorization context an RPC call runs under.
///
/// Marker enum (no data) — the actual tokens live in [`AuthStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthTier {
    /// Remote API credentials. Also the fallback for unclassified methods.
    Default,
    /// Dashboard credentials. Additionally authenticate the push channel
    /// through WebSocket subprotocol negotiation.
    Dashboard,
    /// Advanced-settings credentials.
    AdvancedSettings,
}

impl AuthTier {
    fn index(self) -> usize {
        match self {
            Self::Default => 0,
            Self::Dashboard => 1,
            Self::AdvancedSettings => 2,
        }
    }
}

/// Holds the per-tier Basic tokens plus the derived WebSocket subprotocol
/// token for the dashboard tier.
///
/// Interior mutability so credentials can be rotated through a shared
/// reference; a call already in flight keeps whatever token it read at
/// dispatch time (accepted caller responsibility).
#[derive(Default)]
pub struct AuthStore {
    tokens: RwLock<[Option<SecretString>; 3]>,
    dashboard_subprotocol: RwLock<Option<String>>,
}

impl AuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `username:password` and store it under the tier.
    ///
    /// Last write wins. Setting the [`Dashboard`](AuthTier::Dashboard)
    /// tier also refreshes the WebSocket subprotocol token, because the
    /// push channel authenticates via subprotocol negotiation rather
    /// than headers.
    pub fn set_credentials(&self, tier: AuthTier, username: &str, password: &SecretString) {
        let token = encode_basic(username, password);
        if tier == AuthTier::Dashboard {
            *self
                .dashboard_subprotocol
                .write()
                .expect("auth store lock poisoned") = Some(subprotocol_token(&token));
        }
        self.tokens.write().expect("auth store lock poisoned")[tier.index()] =
            Some(SecretString::from(token));
    }

    /// The stored token for a tier, if any.
    pub fn token(&self, tier: AuthTier) -> Option<SecretString> {
        self.tokens.read().expect("auth store lock poisoned")[tier.index()].clone()
    }

    /// The `Authorization` header value for a tier, if credentials are set.
    ///
    /// Absent credentials mean the call goes out unauthenticated.
    pub fn basic_header(&self, tier: AuthTier) -> Option<String> {
        self.token(tier)
            .map(|t| format!("Basic {}", t.expose_secret()))
    }

    /// The subprotocol tokens to offer on the WebSocket upgrade.
    ///
    /// Empty until dashboard credentials are set.
    pub fn subprotocols(&self) -> Vec<String> {
        self.dashboard_subprotocol
            .read()
            .expect("auth store lock poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

/// `base64(username ":" password)` — the Basic scheme's credential part.
fn encode_basic(username: &str, password: &SecretString) -> String {
    general_purpose::STANDARD.encode(format!("{username}:{}", password.expose_secret()))
}

/// The subprotocol grammar forbids `=`, so base64 padding is
/// percent-escaped. Only `=` is escaped: the rest of the base64 alphabet
/// is valid in a subprotocol token and the backend expects it verbatim.
fn subprotocol_token(token: &str) -> String {
    token.replace('=', "%3D")
}
