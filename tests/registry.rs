mod common;

use common::{serve, Reply};
use minibox::{errors::RegistryError, manifest::BearerToken, registry::Client};

const MANIFEST: &str = r#"{
   "schemaVersion": 1,
   "name": "library/busybox",
   "tag": "latest",
   "architecture": "amd64",
   "fsLayers": [
      {"blobSum": "sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4"},
      {"blobSum": "sha256:df8698476c65c2ee7ca0e9dabc2a8a8e1c3b0c2a07f7c64dc7ab77a2cbcc9e09"}
   ]
}"#;

fn client(base: &str) -> Client {
    Client::builder()
        .auth_url(format!("{}/token", base))
        .registry(base)
        .build()
        .unwrap()
}

fn token(value: &str) -> BearerToken {
    BearerToken {
        token: Some(value.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn acquire_token() {
    common::init_logging();
    let (base, requests) = serve(vec![Reply {
        status: 200,
        body: r#"{"token": "abc", "expires_in": 300, "issued_at": "2020-10-17T01:02:03Z"}"#,
    }])
    .await;

    let token = client(&base).acquire_token("busybox:latest").await.unwrap();
    assert_eq!(token.value(), "abc");
    assert_eq!(token.expires_in, Some(300));

    let requests = requests.await.unwrap();
    let request_line = requests[0].lines().next().unwrap();
    assert!(request_line.starts_with("GET /token?"));
    assert!(request_line.contains("service=registry.docker.io"));
    assert!(request_line.contains("scope=repository%3Alibrary%2Fbusybox%3Apull"));
    assert!(!requests[0].to_lowercase().contains("authorization:"));
}

#[tokio::test]
async fn acquire_token_without_tag() {
    let (base, requests) = serve(vec![Reply {
        status: 200,
        body: r#"{"token": "abc"}"#,
    }])
    .await;
    client(&base).acquire_token("alpine").await.unwrap();
    let requests = requests.await.unwrap();
    assert!(requests[0].contains("library%2Falpine"));
}

#[tokio::test]
async fn missing_token_is_fine() {
    let (base, _) = serve(vec![Reply {
        status: 200,
        body: "{}",
    }])
    .await;
    let token = client(&base).acquire_token("busybox:latest").await.unwrap();
    assert!(token.is_empty());
}

#[tokio::test]
async fn malformed_token_response() {
    let (base, _) = serve(vec![Reply {
        status: 200,
        body: "<html>not json</html>",
    }])
    .await;
    let err = client(&base).acquire_token("busybox:latest").await.unwrap_err();
    assert!(matches!(err, RegistryError::AuthUnavailable(_)));
}

#[tokio::test]
async fn token_server_error() {
    let (base, _) = serve(vec![Reply {
        status: 503,
        body: r#"{"token": "ignored"}"#,
    }])
    .await;
    let err = client(&base).acquire_token("busybox:latest").await.unwrap_err();
    assert!(matches!(err, RegistryError::AuthUnavailable(_)));
}

#[tokio::test]
async fn token_server_unreachable() {
    let base = common::closed_url().await;
    let err = client(&base).acquire_token("busybox:latest").await.unwrap_err();
    assert!(matches!(err, RegistryError::AuthUnavailable(_)));
}

#[tokio::test]
async fn fetch_manifest() {
    let (base, requests) = serve(vec![Reply {
        status: 200,
        body: MANIFEST,
    }])
    .await;

    let manifest = client(&base)
        .fetch_manifest(&token("abc"), "busybox:latest")
        .await
        .unwrap();
    assert_eq!(manifest.name, "library/busybox");
    assert_eq!(manifest.tag, "latest");
    assert_eq!(manifest.layer_digests().len(), 2);
    assert!(manifest.layer_digests()[1].starts_with("sha256:df8698"));

    let requests = requests.await.unwrap();
    let request = requests[0].to_lowercase();
    assert!(request.starts_with("get /v2/library/busybox/manifests/latest "));
    assert!(request.contains("authorization: bearer abc\r\n"));
}

#[tokio::test]
async fn manifest_not_found() {
    let (base, _) = serve(vec![Reply {
        status: 404,
        body: r#"{"errors":[{"code":"MANIFEST_UNKNOWN"}]}"#,
    }])
    .await;
    let err = client(&base)
        .fetch_manifest(&token("abc"), "busybox:nope")
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::ManifestUnavailable(_)));
}

#[tokio::test]
async fn manifest_unreachable() {
    let base = common::closed_url().await;
    let err = client(&base)
        .fetch_manifest(&token("abc"), "busybox:latest")
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::ManifestUnavailable(_)));
}

#[tokio::test]
async fn manifest_not_json() {
    let (base, _) = serve(vec![Reply {
        status: 200,
        body: r#"{"name": "library/busybox", "tag": "latest""#,
    }])
    .await;
    let err = client(&base)
        .fetch_manifest(&token("abc"), "busybox:latest")
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::ManifestParseError(_)));
}

#[tokio::test]
async fn manifest_needs_a_tag() {
    let base = common::closed_url().await;
    let err = client(&base)
        .fetch_manifest(&token("abc"), "busybox")
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidReference(_)));
}

#[tokio::test]
async fn pull_manifest_uses_fresh_token() {
    let (base, requests) = serve(vec![
        Reply {
            status: 200,
            body: r#"{"access_token": "xyz"}"#,
        },
        Reply {
            status: 200,
            body: MANIFEST,
        },
    ])
    .await;

    let manifest = client(&base).pull_manifest("busybox:latest").await.unwrap();
    assert_eq!(manifest.fs_layers.len(), 2);

    let requests = requests.await.unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].starts_with("GET /token?"));
    assert!(requests[1]
        .to_lowercase()
        .contains("authorization: bearer xyz\r\n"));
}

#[tokio::test]
async fn namespaced_repository() {
    let (base, requests) = serve(vec![Reply {
        status: 200,
        body: MANIFEST,
    }])
    .await;
    client(&base)
        .fetch_manifest(&BearerToken::default(), "someone/tool:1.0")
        .await
        .unwrap();
    let requests = requests.await.unwrap();
    assert!(requests[0].starts_with("GET /v2/someone/tool/manifests/1.0 "));
    assert!(!requests[0].to_lowercase().contains("authorization:"));
}
