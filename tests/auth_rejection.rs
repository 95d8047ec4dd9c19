//! Credential rejection over the smart HTTP transport.
//!
//! A mock server answers ref discovery with 401 (or 500), and the clone is
//! expected to fail with the matching error class. libgit2 blocks, so each
//! pass runs on the blocking pool while the server keeps the runtime.

use gitconverge::auth::{AuthSpec, Secret};
use gitconverge::core::cancel::CancelSignal;
use gitconverge::core::config::Config;
use gitconverge::engine::{Engine, EngineError, ErrorKind};
use gitconverge::resources::data;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn refusing_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repo.git/info/refs"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", "Basic realm=\"git\""),
        )
        .mount(&server)
        .await;
    server
}

async fn inspect(url: String, auth: AuthSpec) -> Result<data::RepositoryInfo, EngineError> {
    tokio::task::spawn_blocking(move || {
        let engine = Engine::new(Config::default());
        data::inspect_repository(&engine, &url, "main", &auth, &CancelSignal::new())
    })
    .await
    .expect("blocking task panicked")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bearer_token_refused_is_auth_rejected() {
    let server = refusing_server().await;
    let url = format!("{}/repo.git", server.uri());

    let err = inspect(
        url.clone(),
        AuthSpec::Bearer {
            token: Secret::new("expired-token"),
        },
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AuthRejected, "got {err:?}");
    assert!(!err.is_retryable());
    assert!(err.to_string().contains(&url));

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(!requests.is_empty());
    let authorization = requests[0]
        .headers
        .get("authorization")
        .and_then(|value| value.to_str().ok());
    assert_eq!(authorization, Some("Bearer expired-token"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wrong_password_is_auth_rejected() {
    let server = refusing_server().await;
    let url = format!("{}/repo.git", server.uri());

    let err = inspect(
        url,
        AuthSpec::Basic {
            username: "git".into(),
            password: Secret::new("wrong"),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthRejected, "got {err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn anonymous_access_to_private_remote_is_auth_rejected() {
    let server = refusing_server().await;
    let url = format!("{}/repo.git", server.uri());

    let err = inspect(url, AuthSpec::None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthRejected, "got {err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_error_is_retryable_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repo.git/info/refs"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let url = format!("{}/repo.git", server.uri());

    let err = inspect(url, AuthSpec::None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport, "got {err:?}");
    assert!(err.is_retryable());
}
