use rest_assured::{Callback, Client, ExpectedCall, RestAssuredServerBuilder};
use std::time::{Duration, Instant};

fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

async fn wait_for_calls(client: &Client, method: &str, path: &str, count: usize) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if client.verify(method, path).await.unwrap().len() >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Serving a stub with a callback sends the callback to its target without holding back the
/// response.
#[tokio::test]
async fn callback_test() {
    // Arrange
    let _ = env_logger::try_init();
    let stub_server = Client::start(RestAssuredServerBuilder::new()).await.unwrap();
    let callback_target = Client::start(RestAssuredServerBuilder::new()).await.unwrap();

    callback_target
        .given(&[ExpectedCall::new("POST", "hooks/orders").status(204)])
        .await
        .unwrap();
    stub_server
        .given(&[ExpectedCall::new("POST", "orders")
            .status(201)
            .body(r#"{"id": 7}"#)
            .callback(
                Callback::new("POST", format!("{}/hooks/orders", callback_target.url()))
                    .header("x-order", "7")
                    .body(r#"{"state": "shipped"}"#)
                    .delay(1),
            )])
        .await
        .unwrap();

    // Act
    let start_time = Instant::now();
    let response = http_client()
        .post(format!("{}/orders", stub_server.url()))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), 201);
    assert!(start_time.elapsed() < Duration::from_secs(1));
    assert!(callback_target
        .verify("POST", "hooks/orders")
        .await
        .unwrap()
        .is_empty());

    assert!(wait_for_calls(&callback_target, "POST", "hooks/orders", 1).await);
    assert!(start_time.elapsed() >= Duration::from_secs(1));
}

/// Every callback registered with a stub is sent each time the stub is served.
#[tokio::test]
async fn multiple_callbacks_test() {
    // Arrange
    let _ = env_logger::try_init();
    let stub_server = Client::start(RestAssuredServerBuilder::new()).await.unwrap();
    let callback_target = Client::start(RestAssuredServerBuilder::new()).await.unwrap();

    callback_target
        .given(&[
            ExpectedCall::new("PUT", "first"),
            ExpectedCall::new("DELETE", "second"),
        ])
        .await
        .unwrap();
    stub_server
        .given(&[ExpectedCall::new("GET", "trigger")
            .callback(Callback::new("PUT", format!("{}/first", callback_target.url())))
            .callback(Callback::new("DELETE", format!("{}/second", callback_target.url())))])
        .await
        .unwrap();

    // Act
    for _ in 0..2 {
        let response = http_client()
            .get(format!("{}/trigger", stub_server.url()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    // Assert
    assert!(wait_for_calls(&callback_target, "PUT", "first", 2).await);
    assert!(wait_for_calls(&callback_target, "DELETE", "second", 2).await);
}

/// Unreachable callback targets do not affect the triggering response.
#[tokio::test]
async fn unreachable_callback_target_test() {
    // Arrange
    let _ = env_logger::try_init();
    let stub_server = Client::start(RestAssuredServerBuilder::new()).await.unwrap();

    stub_server
        .given(&[ExpectedCall::new("GET", "lonely")
            .body("still here")
            .callback(Callback::new("POST", "http://127.0.0.1:1/nobody-listens"))])
        .await
        .unwrap();

    // Act
    let response = http_client()
        .get(format!("{}/lonely", stub_server.url()))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "still here");
}

/// A callback without target is rejected before the stub is registered.
#[tokio::test]
async fn callback_without_target_test() {
    // Arrange
    let _ = env_logger::try_init();
    let stub_server = Client::start(RestAssuredServerBuilder::new()).await.unwrap();

    // Act
    let result = stub_server
        .given(&[ExpectedCall::new("GET", "broken").callback(Callback::new("POST", ""))])
        .await;

    // Assert
    assert!(matches!(
        result,
        Err(rest_assured::api::Error::MissingCallbackTarget(_))
    ));
    let response = http_client()
        .get(format!("{}/broken", stub_server.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
