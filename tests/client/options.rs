use std::sync::Arc;

use apiwrap::core::options::{ALLOWED_OPTION_KEYS, validate_keys};
use apiwrap::{ApiClient, ApiError, RequestOptions};
use serde_json::json;

use crate::common::{ScriptedTransport, Step};

fn invalid_keys(r: Result<impl std::fmt::Debug, ApiError>) -> Vec<String> {
    match r {
        Err(ApiError::InvalidOptions { keys }) => keys,
        other => panic!("expected InvalidOptions, got {other:?}"),
    }
}

#[test]
fn allow_list_check_reports_every_offender() {
    let keys = invalid_keys(validate_keys(["foo", "headers", "bar", "foo"], ALLOWED_OPTION_KEYS));
    assert_eq!(keys, vec!["bar", "foo"]);
    assert!(validate_keys(["headers", "timeout", "base_uri"], ALLOWED_OPTION_KEYS).is_ok());
}

#[test]
fn build_rejects_unknown_keys_and_query() {
    let mut client = ApiClient::with_transport(crate::common::config("http://api.test"), ScriptedTransport::always(Step::ok("{}")));

    let opts = RequestOptions::from_value(json!({
        "headers": {"Accept": "application/json"},
        "foo": 1,
        "bar": true,
        "query": {"page": 1}
    }))
    .unwrap();
    assert_eq!(invalid_keys(client.build(opts)), vec!["bar", "foo", "query"]);
    assert!(!client.is_built());
}

#[tokio::test]
async fn requests_reject_unknown_keys_and_persistent_headers() {
    let transport = Arc::new(ScriptedTransport::always(Step::ok("{}")));
    let mut client = ApiClient::with_transport(crate::common::config("http://api.test"), Arc::clone(&transport));
    client.build(RequestOptions::new()).unwrap();

    let opts = RequestOptions::from_value(json!({"frobnicate": 1})).unwrap();
    assert_eq!(invalid_keys(client.get("x", opts).await), vec!["frobnicate"]);

    let opts = RequestOptions::new().persistent_header("X-A", "1");
    assert_eq!(invalid_keys(client.get("x", opts).await), vec!["persistent_headers"]);

    assert_eq!(transport.calls(), 0, "invalid options must not reach the network");
}

#[tokio::test]
async fn reserved_keys_are_dropped_silently() {
    let transport = Arc::new(ScriptedTransport::always(Step::ok("{}")));
    let mut client = ApiClient::with_transport(crate::common::config("http://api.test/v1"), Arc::clone(&transport));
    client
        .build(RequestOptions::from_value(json!({"base_uri": "http://elsewhere", "http_errors": false})).unwrap())
        .unwrap();

    let opts = RequestOptions::from_value(json!({"base_uri": "http://elsewhere"})).unwrap();
    client.get("items", opts).await.unwrap();
    assert_eq!(transport.last_request().unwrap().url.as_str(), "http://api.test/v1/items");
}

#[tokio::test]
async fn options_from_json_reach_the_request() {
    let transport = Arc::new(ScriptedTransport::always(Step::ok("{}")));
    let mut client = ApiClient::with_transport(crate::common::config("http://api.test"), Arc::clone(&transport));
    client.build(RequestOptions::new()).unwrap();

    let opts = RequestOptions::from_value(json!({
        "query": {"page": 2, "tag": "x"},
        "headers": {"X-Trace": "abc"},
        "json": {"name": "widget"},
        "timeout": 1.5
    }))
    .unwrap();
    client.post("items", opts).await.unwrap();

    let req = transport.last_request().unwrap();
    assert_eq!(req.url.query(), Some("page=2&tag=x"));
    assert_eq!(req.headers["x-trace"], "abc");
    assert_eq!(req.headers["content-type"], "application/json");
    assert_eq!(req.body.as_deref(), Some(br#"{"name":"widget"}"#.as_slice()));
    assert_eq!(req.timeout, Some(std::time::Duration::from_millis(1500)));
}

#[tokio::test]
async fn unbuilt_client_and_bad_method_fail_before_dispatch() {
    let transport = Arc::new(ScriptedTransport::always(Step::ok("{}")));
    let client = ApiClient::with_transport(crate::common::config("http://api.test"), Arc::clone(&transport));

    assert!(matches!(
        client.get("x", RequestOptions::new()).await,
        Err(ApiError::ClientNotBuilt)
    ));
    match client.send("CONNECT", "x", RequestOptions::new()).await {
        Err(ApiError::InvalidMethod(m)) => assert_eq!(m, "CONNECT"),
        other => panic!("expected InvalidMethod, got {other:?}"),
    }
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn malformed_header_is_reported() {
    let mut client = ApiClient::with_transport(crate::common::config("http://api.test"), ScriptedTransport::always(Step::ok("{}")));
    client.build(RequestOptions::new()).unwrap();

    let err = client
        .get("x", RequestOptions::new().header("Bad Header", "v"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidHeader(_)));
}
