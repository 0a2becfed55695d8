// Integration tests for `RpcClient` using wiremock.

use std::sync::Arc;

use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use knockaut_api::{AuthStore, AuthTier, Error, RpcClient, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RpcClient, Arc<AuthStore>) {
    let server = MockServer::start().await;
    let auth = Arc::new(AuthStore::new());
    let host = Url::parse(&server.uri()).unwrap();
    let client = RpcClient::new(host, Arc::clone(&auth), &TransportConfig::default()).unwrap();
    (server, client, auth)
}

fn ok_result(value: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "result": value, "id": 1 }))
}

// ── Routing & envelope ──────────────────────────────────────────────

#[tokio::test]
async fn default_tier_routes_to_base_path_without_configurator() {
    let (server, client, _auth) = setup().await;
    client.set_configurator_id(Some(42));

    Mock::given(method("POST"))
        .and(path("/api/"))
        .and(body_partial_json(json!({
            "jsonrpc": "2.0",
            "method": "IPS_GetKernelVersion",
            "params": ["arg"]
        })))
        .respond_with(ok_result(json!("6.0")))
        .expect(1)
        .mount(&server)
        .await;

    let result = client
        .call("IPS_GetKernelVersion", vec![json!("arg")])
        .await
        .unwrap();
    assert_eq!(result, json!("6.0"));

    // No credentials set for the default tier: the call goes out
    // unauthenticated.
    let requests = server.received_requests().await.unwrap();
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn dashboard_tier_routes_to_extended_path_with_configurator_prepended() {
    let (server, client, auth) = setup().await;
    auth.set_credentials(
        AuthTier::Dashboard,
        "dashboard",
        &SecretString::from("pw".to_owned()),
    );
    client.set_configurator_id(Some(7));

    let expected_auth = auth.basic_header(AuthTier::Dashboard).unwrap();

    Mock::given(method("POST"))
        .and(path("/hook/knockaut/api/v1/"))
        .and(header("authorization", expected_auth.as_str()))
        .and(body_partial_json(json!({
            "method": "KNO_RunScene",
            "params": [7, 5]
        })))
        .respond_with(ok_result(json!(true)))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.call("KNO_RunScene", vec![json!(5)]).await.unwrap();
    assert_eq!(result, json!(true));
}

#[tokio::test]
async fn configurator_management_stays_on_base_path() {
    let (server, client, _auth) = setup().await;
    client.set_configurator_id(Some(3));

    // WFC_ methods classify into the dashboard tier (configurator id
    // still prepended) but route to the base API path.
    Mock::given(method("POST"))
        .and(path("/api/"))
        .and(body_partial_json(json!({
            "method": "WFC_GetSnapshot",
            "params": [3]
        })))
        .respond_with(ok_result(json!({ "objects": {}, "profiles": {} })))
        .expect(1)
        .mount(&server)
        .await;

    client.call("WFC_GetSnapshot", vec![]).await.unwrap();
}

#[tokio::test]
async fn missing_configurator_prepends_null() {
    let (server, client, _auth) = setup().await;

    Mock::given(method("POST"))
        .and(path("/hook/knockaut/api/v1/"))
        .and(body_partial_json(json!({
            "method": "KNO_GetAlarms",
            "params": [null]
        })))
        .respond_with(ok_result(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    client.call("KNO_GetAlarms", vec![]).await.unwrap();
}

#[tokio::test]
async fn advanced_settings_tier_uses_its_own_credential() {
    let (server, client, auth) = setup().await;
    auth.set_credentials(
        AuthTier::Dashboard,
        "dashboard",
        &SecretString::from("dash".to_owned()),
    );
    auth.set_credentials(
        AuthTier::AdvancedSettings,
        "advanced",
        &SecretString::from("adv".to_owned()),
    );
    client.set_configurator_id(Some(1));

    let advanced_auth = auth.basic_header(AuthTier::AdvancedSettings).unwrap();
    let dashboard_auth = auth.basic_header(AuthTier::Dashboard).unwrap();
    assert_ne!(advanced_auth, dashboard_auth);

    Mock::given(method("POST"))
        .and(path("/hook/knockaut/api/v1/"))
        .and(header("authorization", advanced_auth.as_str()))
        .and(body_partial_json(json!({ "method": "KNO_SyncScene" })))
        .respond_with(ok_result(json!(true)))
        .expect(1)
        .mount(&server)
        .await;

    client
        .call("KNO_SyncScene", vec![json!({ "name": "Evening" })])
        .await
        .unwrap();
}

#[tokio::test]
async fn rotated_credentials_apply_to_the_next_call() {
    let (server, client, auth) = setup().await;
    auth.set_credentials(
        AuthTier::Dashboard,
        "dashboard",
        &SecretString::from("old".to_owned()),
    );
    auth.set_credentials(
        AuthTier::Dashboard,
        "dashboard",
        &SecretString::from("new".to_owned()),
    );
    client.set_configurator_id(Some(1));

    let expected_auth = auth.basic_header(AuthTier::Dashboard).unwrap();

    Mock::given(method("POST"))
        .and(header("authorization", expected_auth.as_str()))
        .respond_with(ok_result(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    client.call("KNO_GetIcons", vec![]).await.unwrap();
}

// ── Result & error unwrapping ───────────────────────────────────────

#[tokio::test]
async fn result_is_returned_verbatim() {
    let (server, client, _auth) = setup().await;

    let payload = json!([{ "id": 1, "name": "Ground Floor" }, { "id": 2, "name": "Attic" }]);
    Mock::given(method("POST"))
        .and(path("/api/"))
        .respond_with(ok_result(payload.clone()))
        .mount(&server)
        .await;

    let result = client.call("WFC_GetConfigurators", vec![]).await.unwrap();
    assert_eq!(result, payload);
}

#[tokio::test]
async fn backend_error_message_is_surfaced_exactly() {
    let (server, client, _auth) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "error": { "message": "bad password", "code": -32600 },
            "id": 1
        })))
        .mount(&server)
        .await;

    let result = client.call("IPS_GetKernelVersion", vec![]).await;
    match result {
        Err(Error::Rpc { ref message }) => assert_eq!(message, "bad password"),
        other => panic!("expected Rpc error, got: {other:?}"),
    }
}

#[tokio::test]
async fn error_without_message_wraps_the_raw_value() {
    let (server, client, _auth) = setup().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "jsonrpc": "2.0", "error": -32700, "id": 1 })),
        )
        .mount(&server)
        .await;

    let result = client.call("IPS_GetKernelVersion", vec![]).await;
    match result {
        Err(Error::Rpc { ref message }) => assert_eq!(message, "-32700"),
        other => panic!("expected Rpc error, got: {other:?}"),
    }
}

#[tokio::test]
async fn non_2xx_with_unparseable_body_is_a_transport_failure() {
    let (server, client, _auth) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    let result = client.call("IPS_GetKernelVersion", vec![]).await;
    match result {
        Err(Error::Http { status, ref body }) => {
            assert_eq!(status, 502);
            assert!(body.contains("Bad Gateway"));
        }
        other => panic!("expected Http error, got: {other:?}"),
    }
}

#[tokio::test]
async fn missing_result_field_yields_null() {
    let (server, client, _auth) = setup().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1 })),
        )
        .mount(&server)
        .await;

    let result = client.call("IPS_ApplyChanges", vec![json!(123)]).await.unwrap();
    assert_eq!(result, Value::Null);
}
