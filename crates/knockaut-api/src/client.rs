//! High-level client facade.
//!
//! Composes the [`AuthStore`], the RPC dispatcher, and the session
//! manager behind one handle. The generated method-wrapper surface
//! calls through [`call`](KnockautClient::call); only a few representative
//! wrappers live here.

use std::sync::Arc;

use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::auth::{AuthStore, AuthTier};
use crate::error::Error;
use crate::rpc::RpcClient;
use crate::session::{
    SessionConfig, SessionListener, SessionManager, SessionSink, websocket_url,
};
use crate::snapshot::Snapshot;
use crate::transport::TransportConfig;

/// Fixed username the backend expects for dashboard credentials.
pub const DASHBOARD_USERNAME: &str = "dashboard";

/// Fixed username the backend expects for advanced-settings credentials.
pub const ADVANCED_SETTINGS_USERNAME: &str = "advanced";

/// Connection options for the backend.
#[derive(Debug, Clone)]
pub struct ApiOptions {
    pub host: Url,
    /// Remote API credentials, applied to the default tier when both
    /// are present.
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

impl ApiOptions {
    pub fn new(host: Url) -> Self {
        Self {
            host,
            username: None,
            password: None,
        }
    }
}

/// Client handle for one backend gateway.
pub struct KnockautClient {
    host: Url,
    auth: Arc<AuthStore>,
    rpc: RpcClient,
    session: SessionManager,
}

impl KnockautClient {
    pub fn new(
        options: ApiOptions,
        transport: &TransportConfig,
        session: SessionConfig,
    ) -> Result<Self, Error> {
        let auth = Arc::new(AuthStore::new());
        if let (Some(username), Some(password)) = (&options.username, &options.password) {
            auth.set_credentials(AuthTier::Default, username, password);
        }

        let rpc = RpcClient::new(options.host.clone(), Arc::clone(&auth), transport)?;
        let session = SessionManager::new(session, Arc::clone(&auth));

        Ok(Self {
            host: options.host,
            auth,
            rpc,
            session,
        })
    }

    /// The shared authorization store.
    pub fn auth(&self) -> &Arc<AuthStore> {
        &self.auth
    }

    /// Direct access to the session manager.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    // ── Credentials ──────────────────────────────────────────────────

    pub fn set_default_credentials(&self, username: &str, password: &SecretString) {
        self.auth.set_credentials(AuthTier::Default, username, password);
    }

    /// Set the dashboard password; also refreshes the push-channel
    /// subprotocol token used on the next (re)connect.
    pub fn set_dashboard_password(&self, password: &SecretString) {
        self.auth
            .set_credentials(AuthTier::Dashboard, DASHBOARD_USERNAME, password);
    }

    pub fn set_advanced_settings_password(&self, password: &SecretString) {
        self.auth.set_credentials(
            AuthTier::AdvancedSettings,
            ADVANCED_SETTINGS_USERNAME,
            password,
        );
    }

    // ── Configurator scope ───────────────────────────────────────────

    /// Select the configurator that scopes dashboard calls and resolve
    /// the push-channel URL for it.
    pub fn set_configurator_id(&self, id: u32) -> Result<(), Error> {
        self.rpc.set_configurator_id(Some(id));
        self.session.set_url(websocket_url(&self.host, id)?);
        Ok(())
    }

    pub fn configurator_id(&self) -> Option<u32> {
        self.rpc.configurator_id()
    }

    // ── Push channel ─────────────────────────────────────────────────

    pub fn connect(&self) -> Result<(), Error> {
        self.session.connect()
    }

    pub fn close(&self) {
        self.session.close();
    }

    pub fn set_listener(&self, listener: Arc<dyn SessionListener>) -> Result<(), Error> {
        self.session.set_listener(listener)
    }

    pub fn remove_listener(&self) {
        self.session.remove_listener();
    }

    pub fn set_sink(&self, sink: Arc<dyn SessionSink>) {
        self.session.set_sink(sink);
    }

    /// Send any serializable value over the live push channel.
    pub fn send_json(&self, value: &impl Serialize) -> Result<(), Error> {
        self.session.send_json(value)
    }

    // ── RPC surface ──────────────────────────────────────────────────

    /// Dispatch an arbitrary backend method.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, Error> {
        self.rpc.call(method, params).await
    }

    /// List the configurators available on this gateway.
    pub async fn get_configurators(&self) -> Result<Value, Error> {
        self.rpc.call("WFC_GetConfigurators", vec![]).await
    }

    /// Fetch the active configurator's full object snapshot.
    pub async fn get_snapshot(&self) -> Result<Snapshot, Error> {
        let raw = self.rpc.call("WFC_GetSnapshot", vec![]).await?;
        serde_json::from_value(raw.clone()).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: raw.to_string(),
        })
    }

    /// Run a script in the active configurator's scope.
    pub async fn execute(&self, script_id: u32) -> Result<Value, Error> {
        self.rpc
            .call("WFC_Execute", vec![Value::from(script_id)])
            .await
    }
}
