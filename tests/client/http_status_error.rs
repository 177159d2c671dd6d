use apiwrap::{ApiClient, ApiError, RequestOptions};
use httpmock::Method::{DELETE, GET};
use httpmock::MockServer;

#[tokio::test]
async fn client_error_status_maps_to_status_error() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(DELETE).path("/items/7");
        then.status(403).body("forbidden");
    });

    let mut client = ApiClient::new(crate::common::config(&server.base_url()));
    client.build(RequestOptions::new()).unwrap();

    let err = client.delete("items/7", RequestOptions::new()).await.unwrap_err();
    mock.assert();
    match err {
        ApiError::Status { status, url, retries } => {
            assert_eq!(status, 403);
            assert!(url.ends_with("/items/7"), "url: {url}");
            assert_eq!(retries, 0);
        }
        other => panic!("expected Status, got {other:?}"),
    }
}

#[tokio::test]
async fn server_error_status_maps_to_server_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/boom");
        then.status(500);
    });

    let mut client = ApiClient::new(crate::common::config(&server.base_url()));
    client.build(RequestOptions::new()).unwrap();

    let err = client.get("boom", RequestOptions::new()).await.unwrap_err();
    assert!(matches!(err, ApiError::ServerError { status: 500, .. }));
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn no_content_is_a_success() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/empty");
        then.status(204);
    });

    let mut client = ApiClient::new(crate::common::config(&server.base_url()));
    client.build(RequestOptions::new()).unwrap();

    let resp = client.get("empty", RequestOptions::new()).await.unwrap();
    assert_eq!(resp.status().as_u16(), 204);
    assert!(resp.raw().is_empty());
}

#[tokio::test]
async fn error_urls_never_contain_the_api_key() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/secret").query_param("api_key", "test");
        then.status(401);
    });

    let mut client = ApiClient::new(crate::common::query_config(&server.base_url()));
    client.build(RequestOptions::new()).unwrap();

    let err = client
        .get("secret", RequestOptions::new().query("page", "1"))
        .await
        .unwrap_err();
    let shown = err.to_string();
    assert!(shown.contains("api_key=REDACTED"), "{shown}");
    assert!(shown.contains("page=1"), "{shown}");
    assert!(!shown.contains("api_key=test"), "{shown}");
    assert!(!format!("{err:?}").contains("api_key=test"));
}

#[tokio::test]
async fn transport_errors_never_contain_the_api_key() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let config = apiwrap::ClientConfig::builder()
        .api_url(format!("http://127.0.0.1:{port}"))
        .api_key("supersecret")
        .api_requires_query(true)
        .api_param_name("api_key")
        .build()
        .unwrap();
    let mut client = ApiClient::new(config);
    client.build(RequestOptions::new()).unwrap();
    crate::common::fast_retries(&mut client, 1);

    let err = client.get("x", RequestOptions::new()).await.unwrap_err();
    assert!(matches!(err, ApiError::Transport { retries: 1, .. }), "{err:?}");

    let mut chain = vec![err.to_string(), format!("{err:?}")];
    let mut source = std::error::Error::source(&err);
    while let Some(e) = source {
        chain.push(e.to_string());
        chain.push(format!("{e:?}"));
        source = e.source();
    }
    for text in chain {
        assert!(!text.contains("supersecret"), "{text}");
    }
}
