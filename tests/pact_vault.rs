//! Pact contract tests for the Vault HTTP API
//!
//! These tests define the contract between the controller's vault client and
//! Vault: Kubernetes auth login and the KV v1/v2 read, write and delete calls
//! used to persist user credentials.

mod common;

use common::init_rustls;
use pact_consumer::prelude::*;
use radosgw_user_controller::vault::{KvVersion, VaultClient, VaultSettings};
use serde_json::json;
use std::collections::HashMap;

const TOKEN: &str = "test-vault-token";

/// Mock server URL without the trailing slash
fn base_url(mut url: String) -> String {
    if url.ends_with('/') {
        url.pop();
    }
    url
}

fn credentials() -> HashMap<String, String> {
    HashMap::from([
        ("access_key".to_string(), "AKIAEXAMPLE000000000".to_string()),
        ("secret_key".to_string(), "secret-example".to_string()),
    ])
}

#[tokio::test]
async fn test_vault_kubernetes_login_contract() {
    init_rustls();
    // Dev mode bypasses the login entirely
    if std::env::var("VAULT_TOKEN").is_ok() && std::env::var("VAULT_ADDR").is_ok() {
        return;
    }

    let token_path = std::env::temp_dir().join(format!("radosgw-pact-sa-token-{}", std::process::id()));
    std::fs::write(&token_path, "service-account-jwt\n").expect("Failed to write token file");

    let mut pact_builder = PactBuilder::new("RadosGW-User-Controller", "Vault");
    pact_builder.interaction("log in with a service-account token", "", |mut i| {
        i.given("the kubernetes auth method is enabled with role radosgw-users");
        i.request
            .method("POST")
            .path("/v1/auth/kubernetes/login")
            .header("content-type", "application/json")
            .json_body(json!({
                "role": "radosgw-users",
                "jwt": "service-account-jwt"
            }));
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "auth": {
                    "client_token": TOKEN,
                    "lease_duration": 3600,
                    "renewable": true
                }
            }));
        i
    });
    pact_builder.interaction("read with the issued token", "", |mut i| {
        i.given("no secret is stored at radosgw/prod1/users/alice");
        i.request
            .method("GET")
            .path("/v1/secret/data/radosgw/prod1/users/alice")
            .header("X-Vault-Token", TOKEN);
        i.response.status(404).json_body(json!({ "errors": [] }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let settings = VaultSettings {
        address: base_url(mock_server.url().to_string()),
        role: "radosgw-users".to_string(),
        mount_path: "secret".to_string(),
        kv_version: KvVersion::V2,
    };

    let client = VaultClient::connect(&settings, token_path.to_str().unwrap())
        .await
        .expect("login should succeed");
    let stored = client
        .read("radosgw/prod1/users/alice")
        .await
        .expect("404 is not an error");
    assert!(stored.is_none());

    let _ = std::fs::remove_file(&token_path);
}

#[tokio::test]
async fn test_vault_kv2_write_contract() {
    init_rustls();
    let mut pact_builder = PactBuilder::new("RadosGW-User-Controller", "Vault");
    pact_builder.interaction("write user credentials to KV v2", "", |mut i| {
        i.given("a KV v2 engine is mounted at secret");
        i.request
            .method("POST")
            .path("/v1/secret/data/radosgw/prod1/users/alice")
            .header("X-Vault-Token", TOKEN)
            .header("content-type", "application/json")
            .json_body(json!({
                "data": {
                    "access_key": "AKIAEXAMPLE000000000",
                    "secret_key": "secret-example"
                }
            }));
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "data": {
                    "created_time": "2024-01-01T00:00:00Z",
                    "version": 1
                }
            }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = VaultClient::with_token(&base_url(mock_server.url().to_string()), TOKEN, "secret", KvVersion::V2)
        .expect("client");

    client
        .write("radosgw/prod1/users/alice", &credentials())
        .await
        .expect("write should succeed");
}

#[tokio::test]
async fn test_vault_kv2_read_contract() {
    init_rustls();
    let mut pact_builder = PactBuilder::new("RadosGW-User-Controller", "Vault");
    pact_builder.interaction("read user credentials from KV v2", "", |mut i| {
        i.given("credentials are stored at radosgw/prod1/users/alice");
        i.request
            .method("GET")
            .path("/v1/secret/data/radosgw/prod1/users/alice")
            .header("X-Vault-Token", TOKEN);
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "data": {
                    "data": {
                        "access_key": "AKIAEXAMPLE000000000",
                        "secret_key": "secret-example"
                    },
                    "metadata": {
                        "created_time": "2024-01-01T00:00:00Z",
                        "version": 1
                    }
                }
            }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = VaultClient::with_token(&base_url(mock_server.url().to_string()), TOKEN, "secret", KvVersion::V2)
        .expect("client");

    let stored = client
        .read("radosgw/prod1/users/alice")
        .await
        .expect("read should succeed")
        .expect("credentials present");
    assert_eq!(stored, credentials());
}

#[tokio::test]
async fn test_vault_kv2_delete_contract() {
    init_rustls();
    let mut pact_builder = PactBuilder::new("RadosGW-User-Controller", "Vault");
    pact_builder.interaction("delete the latest version of user credentials", "", |mut i| {
        i.given("credentials are stored at radosgw/prod1/users/alice");
        i.request
            .method("DELETE")
            .path("/v1/secret/data/radosgw/prod1/users/alice")
            .header("X-Vault-Token", TOKEN);
        i.response.status(204);
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = VaultClient::with_token(&base_url(mock_server.url().to_string()), TOKEN, "secret", KvVersion::V2)
        .expect("client");

    client
        .delete("radosgw/prod1/users/alice")
        .await
        .expect("delete should succeed");
}

#[tokio::test]
async fn test_vault_kv1_round_trip_contract() {
    init_rustls();
    let mut pact_builder = PactBuilder::new("RadosGW-User-Controller", "Vault");
    pact_builder.interaction("write user credentials to KV v1", "", |mut i| {
        i.given("a KV v1 engine is mounted at kv");
        i.request
            .method("POST")
            .path("/v1/kv/radosgw/prod1/users/alice")
            .header("X-Vault-Token", TOKEN)
            .json_body(json!({
                "access_key": "AKIAEXAMPLE000000000",
                "secret_key": "secret-example"
            }));
        i.response.status(204);
        i
    });
    pact_builder.interaction("read user credentials from KV v1", "", |mut i| {
        i.given("credentials are stored at kv/radosgw/prod1/users/alice");
        i.request
            .method("GET")
            .path("/v1/kv/radosgw/prod1/users/alice")
            .header("X-Vault-Token", TOKEN);
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "data": {
                    "access_key": "AKIAEXAMPLE000000000",
                    "secret_key": "secret-example"
                },
                "lease_duration": 2764800
            }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = VaultClient::with_token(&base_url(mock_server.url().to_string()), TOKEN, "kv", KvVersion::V1)
        .expect("client");

    client
        .write("radosgw/prod1/users/alice", &credentials())
        .await
        .expect("write should succeed");
    let stored = client.read("radosgw/prod1/users/alice").await.unwrap();
    assert_eq!(stored, Some(credentials()));
}

#[tokio::test]
async fn test_vault_rejected_token_is_renewed_contract() {
    init_rustls();
    let token_path =
        std::env::temp_dir().join(format!("radosgw-pact-sa-token-renew-{}", std::process::id()));
    std::fs::write(&token_path, "rotated-service-account-jwt\n").expect("Failed to write token file");

    let mut pact_builder = PactBuilder::new("RadosGW-User-Controller", "Vault");
    pact_builder.interaction("read with an expired token", "", |mut i| {
        i.given("the token expired-vault-token has expired");
        i.request
            .method("GET")
            .path("/v1/secret/data/radosgw/prod1/users/alice")
            .header("X-Vault-Token", "expired-vault-token");
        i.response
            .status(403)
            .header("content-type", "application/json")
            .json_body(json!({ "errors": ["permission denied"] }));
        i
    });
    pact_builder.interaction("log in again with the rotated service-account token", "", |mut i| {
        i.given("the kubernetes auth method is enabled with role radosgw-users");
        i.request
            .method("POST")
            .path("/v1/auth/kubernetes/login")
            .json_body(json!({
                "role": "radosgw-users",
                "jwt": "rotated-service-account-jwt"
            }));
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({ "auth": { "client_token": TOKEN, "lease_duration": 3600 } }));
        i
    });
    pact_builder.interaction("read with the renewed token", "", |mut i| {
        i.given("credentials are stored at radosgw/prod1/users/alice");
        i.request
            .method("GET")
            .path("/v1/secret/data/radosgw/prod1/users/alice")
            .header("X-Vault-Token", TOKEN);
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "data": {
                    "data": {
                        "access_key": "AKIAEXAMPLE000000000",
                        "secret_key": "secret-example"
                    },
                    "metadata": { "version": 1 }
                }
            }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = VaultClient::with_token(
        &base_url(mock_server.url().to_string()),
        "expired-vault-token",
        "secret",
        KvVersion::V2,
    )
    .expect("client")
    .with_kubernetes_login("radosgw-users", token_path.to_str().unwrap());

    let stored = client
        .read("radosgw/prod1/users/alice")
        .await
        .expect("read should succeed after renewal");
    assert_eq!(stored, Some(credentials()));

    let _ = std::fs::remove_file(&token_path);
}

#[tokio::test]
async fn test_vault_rejected_static_token_is_reported_contract() {
    init_rustls();
    let mut pact_builder = PactBuilder::new("RadosGW-User-Controller", "Vault");
    pact_builder.interaction("write with a revoked static token", "", |mut i| {
        i.given("the token revoked-vault-token was revoked");
        i.request
            .method("POST")
            .path("/v1/secret/data/radosgw/prod1/users/alice")
            .header("X-Vault-Token", "revoked-vault-token");
        i.response
            .status(403)
            .header("content-type", "application/json")
            .json_body(json!({ "errors": ["permission denied"] }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = VaultClient::with_token(
        &base_url(mock_server.url().to_string()),
        "revoked-vault-token",
        "secret",
        KvVersion::V2,
    )
    .expect("client");

    let err = client
        .write("radosgw/prod1/users/alice", &credentials())
        .await
        .unwrap_err();
    assert!(err.is_auth_failure());
    assert!(err.is_retryable());
}
