//! `ReqwestTransport` + `RequestChannel` against a local HTTP server speaking Digest auth.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use philipstv_manager::{Credentials, DeviceError, RequestChannel, ReqwestTransport};

const CHALLENGE: &str = r#"Digest realm="tv", nonce="abc123", qop="auth", opaque="xyz""#;
const TIMEOUT: Duration = Duration::from_secs(5);

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input))
}

/// Parse the `key=value` pairs of a Digest `Authorization` header.
fn digest_fields(authorization: &str) -> HashMap<String, String> {
    authorization
        .trim_start_matches("Digest ")
        .split(", ")
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_string(), value.trim_matches('"').to_string()))
        .collect()
}

/// Check a request's Digest response the way the TV does.
fn is_authorized(request: &Request) -> bool {
    let Some(authorization) = request
        .headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };

    let fields = digest_fields(authorization);
    let field = |name: &str| fields.get(name).cloned().unwrap_or_default();

    let ha1 = md5_hex("user:tv:secret");
    let ha2 = md5_hex(&format!("{}:{}", request.method, field("uri")));
    let expected = md5_hex(&format!(
        "{}:abc123:{}:{}:auth:{}",
        ha1,
        field("nc"),
        field("cnonce"),
        ha2
    ));

    field("username") == "user"
        && field("realm") == "tv"
        && field("opaque") == "xyz"
        && field("response") == expected
}

fn digest_protected(body: &'static str) -> impl Fn(&Request) -> ResponseTemplate {
    move |request: &Request| {
        if is_authorized(request) {
            ResponseTemplate::new(200).set_body_string(body)
        } else {
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", CHALLENGE)
        }
    }
}

fn channel(credentials: Option<Credentials>) -> RequestChannel {
    RequestChannel::new(Arc::new(ReqwestTransport::new().unwrap()), credentials)
}

fn url(server: &MockServer, api_path: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), api_path)).unwrap()
}

#[tokio::test]
async fn challenge_is_answered_then_reused() {
    let server = MockServer::start().await;

    Mock::given(path("/6/powerstate"))
        .respond_with(digest_protected(r#"{"powerstate":"On"}"#))
        .mount(&server)
        .await;

    let mut channel = channel(Some(Credentials::new("user", "secret")));

    let first = channel
        .execute(Method::GET, &url(&server, "/6/powerstate"), None, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(first.body, r#"{"powerstate":"On"}"#);

    let second = channel
        .execute(Method::POST, &url(&server, "/6/powerstate"), Some("{}"), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(second.status, 200);

    // One challenge round trip, then the cached challenge is reused
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].headers.get("authorization").is_none());

    let counters: Vec<String> = requests[1..]
        .iter()
        .map(|request| {
            let authorization = request.headers.get("authorization").unwrap();
            digest_fields(authorization.to_str().unwrap())["nc"].clone()
        })
        .collect();
    assert_eq!(counters, vec!["00000001", "00000002"]);

    assert_eq!(requests[2].body, b"{}");
    assert_eq!(
        requests[2].headers.get("content-type").unwrap(),
        "application/json"
    );
}

#[tokio::test]
async fn wrong_credentials_are_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(digest_protected("{}"))
        .mount(&server)
        .await;

    let mut channel = channel(Some(Credentials::new("user", "wrong")));

    let result = channel
        .execute(Method::GET, &url(&server, "/6/audio/volume"), None, TIMEOUT)
        .await;

    assert!(matches!(result, Err(DeviceError::Unauthorized(_))));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn application_errors_carry_readable_message() {
    let server = MockServer::start().await;

    Mock::given(path("/6/ambilight/currentconfiguration"))
        .respond_with(ResponseTemplate::new(503).set_body_string(
            "<html><head><title>Service Unavailable</title></head><body></body></html>",
        ))
        .mount(&server)
        .await;

    let result = channel(None)
        .execute(
            Method::GET,
            &url(&server, "/6/ambilight/currentconfiguration"),
            None,
            TIMEOUT,
        )
        .await;

    assert_eq!(
        result,
        Err(DeviceError::Status {
            status: 503,
            message: "Service Unavailable".into()
        })
    );
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = MockServer::start().await;

    Mock::given(path("/6/notifychange"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let result = channel(None)
        .execute(
            Method::POST,
            &url(&server, "/6/notifychange"),
            Some("{}"),
            Duration::from_millis(200),
        )
        .await;

    assert_eq!(result, Err(DeviceError::Timeout));
}
