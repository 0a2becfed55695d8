//! knockaut-api: async Rust client for the Knockaut home-automation
//! backend (JSON-RPC over HTTP + WebSocket push channel).
//!
//! Calls route through one of three independent authorization tiers
//! (remote API, dashboard, advanced settings), each with its own Basic
//! credential; the push channel survives flaky networks with a bounded
//! fixed-delay reconnect loop; and the icon engine derives display
//! icons from snapshot objects and their variable profiles.
//!
//! # Example
//!
//! ```rust,ignore
//! use knockaut_api::{ApiOptions, KnockautClient, SessionConfig, TransportConfig};
//! use secrecy::SecretString;
//! use url::Url;
//!
//! let options = ApiOptions::new(Url::parse("https://gateway.local")?);
//! let client = KnockautClient::new(options, &TransportConfig::default(), SessionConfig::default())?;
//!
//! client.set_dashboard_password(&SecretString::from("secret".to_owned()));
//! client.set_configurator_id(42)?;
//! client.connect()?;
//!
//! let snapshot = client.get_snapshot().await?;
//! ```

pub mod auth;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod icons;
pub mod rpc;
pub mod session;
pub mod snapshot;
pub mod transport;

pub use auth::{AuthStore, AuthTier};
pub use client::{ApiOptions, KnockautClient};
pub use error::Error;
pub use icons::{IconRef, IconResolution, IconResolver};
pub use rpc::RpcClient;
pub use session::{
    MessageCode, PushFrame, SessionConfig, SessionListener, SessionManager, SessionSink,
    websocket_url,
};
pub use snapshot::{ObjectKind, Snapshot, SnapshotObject, VariableKind, VariableProfile};
pub use transport::{TlsMode, TransportConfig};
