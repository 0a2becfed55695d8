//! JSON-RPC dispatcher.
//!
//! Builds the `{jsonrpc, method, params, id}` envelope, routes the call
//! to the right URL path for its authorization tier, attaches the tier's
//! Basic token, and unwraps `result` or surfaces the backend's `error`.
//! One logical call is exactly one HTTP POST — no retries at this layer.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::auth::{AuthStore, AuthTier};
use crate::endpoints;
use crate::error::Error;
use crate::transport::TransportConfig;

/// Base API path for default-tier and configurator-management calls.
pub const BASE_API_PATH: &str = "/api/";

/// Extended API path for dashboard and advanced-settings calls.
pub const EXTENDED_API_PATH: &str = "/hook/knockaut/api/v1/";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a [Value],
    /// Wall-clock milliseconds. Not used for correlation — the backend
    /// only logs it, and collisions are tolerated.
    id: i64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Dispatches JSON-RPC calls to the backend.
///
/// Holds the shared [`AuthStore`] and the active configurator id; both
/// are read at call time, so credential rotation applies to the next
/// dispatch without rebuilding the client.
pub struct RpcClient {
    http: reqwest::Client,
    host: Url,
    auth: Arc<AuthStore>,
    configurator_id: RwLock<Option<u32>>,
}

impl RpcClient {
    pub fn new(host: Url, auth: Arc<AuthStore>, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            host,
            auth,
            configurator_id: RwLock::new(None),
        })
    }

    /// The backend host this client dispatches to.
    pub fn host(&self) -> &Url {
        &self.host
    }

    /// Select the configurator that scopes dashboard and
    /// advanced-settings calls.
    pub fn set_configurator_id(&self, id: Option<u32>) {
        *self
            .configurator_id
            .write()
            .expect("configurator lock poisoned") = id;
    }

    pub fn configurator_id(&self) -> Option<u32> {
        *self
            .configurator_id
            .read()
            .expect("configurator lock poisoned")
    }

    /// Dispatch a single JSON-RPC call and return `result` verbatim.
    ///
    /// Dashboard and advanced-settings methods get the active
    /// configurator id prepended to `params`; when none is selected,
    /// `null` is prepended instead — selecting a configurator first is a
    /// caller contract, not enforced here. The untyped payload is the
    /// caller's to interpret.
    pub async fn call(&self, method: &str, mut params: Vec<Value>) -> Result<Value, Error> {
        let tier = endpoints::classify(method);

        if tier != AuthTier::Default {
            let id = self.configurator_id().map_or(Value::Null, Value::from);
            params.insert(0, id);
        }

        let path = if tier == AuthTier::Default || endpoints::uses_base_path(method) {
            BASE_API_PATH
        } else {
            EXTENDED_API_PATH
        };
        let url = self.host.join(path).map_err(Error::InvalidUrl)?;

        let envelope = RpcRequest {
            jsonrpc: "2.0",
            method,
            params: &params,
            id: Utc::now().timestamp_millis(),
        };

        debug!(method, %url, ?tier, "dispatching RPC call");

        let mut request = self.http.post(url).json(&envelope);
        if let Some(header) = self.auth.basic_header(tier) {
            request = request.header(AUTHORIZATION, header);
        }

        let resp = request.send().await.map_err(Error::Transport)?;
        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        let parsed: RpcResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(Error::Http {
                    status: status.as_u16(),
                    body,
                });
            }
            Err(e) => {
                return Err(Error::Deserialization {
                    message: e.to_string(),
                    body,
                });
            }
        };

        if let Some(error) = parsed.error {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| error.to_string(), str::to_owned);
            tracing::error!(method, ?params, %message, "backend returned an RPC error");
            return Err(Error::Rpc { message });
        }

        Ok(parsed.result.unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_to_jsonrpc_2() {
        let params = vec![Value::from(42)];
        let envelope = RpcRequest {
            jsonrpc: "2.0",
            method: "WFC_Execute",
            params: &params,
            id: 1_700_000_000_000,
        };

        let json = serde_json::to_value(&envelope).expect("serializes");
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "WFC_Execute");
        assert_eq!(json["params"], serde_json::json!([42]));
        assert_eq!(json["id"], 1_700_000_000_000_i64);
    }

    #[test]
    fn response_tolerates_missing_fields() {
        let parsed: RpcResponse = serde_json::from_str("{}").expect("parses");
        assert!(parsed.result.is_none());
        assert!(parsed.error.is_none());
    }
}
