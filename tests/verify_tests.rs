use rest_assured::{Client, ExpectedCall, RestAssuredServerBuilder};

fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Every served call is recorded in order and reported by verification.
#[tokio::test]
async fn verify_made_calls_test() {
    // Arrange
    let _ = env_logger::try_init();
    let client = Client::start(RestAssuredServerBuilder::new()).await.unwrap();
    let http_client = http_client();

    client
        .given(&[
            ExpectedCall::new("PUT", "accounts/7").status(202).body("first"),
            ExpectedCall::new("PUT", "accounts/7").status(409).body("second"),
        ])
        .await
        .unwrap();

    // Act
    for _ in 0..2 {
        http_client
            .put(format!("{}/accounts/7", client.url()))
            .send()
            .await
            .unwrap();
    }
    let made_calls = client.verify("PUT", "/accounts/7/").await.unwrap();

    // Assert
    assert_eq!(made_calls.len(), 2);
    assert_eq!(made_calls[0].status_code, 202);
    assert_eq!(made_calls[0].response, "first");
    assert_eq!(made_calls[1].status_code, 409);
    assert_eq!(made_calls[1].response, "second");
    assert_eq!(made_calls[1].path, "accounts/7");
}

/// Keys that were never served verify as an empty list.
#[tokio::test]
async fn verify_untouched_key_test() {
    // Arrange
    let _ = env_logger::try_init();
    let client = Client::start(RestAssuredServerBuilder::new()).await.unwrap();

    client
        .given(&[ExpectedCall::new("GET", "never-called")])
        .await
        .unwrap();

    // Act
    let made_calls = client.verify("GET", "never-called").await.unwrap();

    // Assert
    assert!(made_calls.is_empty());
}

/// Clearing a key also forgets the calls that were made for it.
#[tokio::test]
async fn clear_forgets_made_calls_test() {
    // Arrange
    let _ = env_logger::try_init();
    let client = Client::start(RestAssuredServerBuilder::new()).await.unwrap();

    client
        .given(&[ExpectedCall::new("GET", "items")])
        .await
        .unwrap();
    http_client()
        .get(format!("{}/items", client.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(client.verify("GET", "items").await.unwrap().len(), 1);

    // Act
    client.clear("GET", "items").await.unwrap();

    // Assert
    assert!(client.verify("GET", "items").await.unwrap().is_empty());
}

/// Verification fails when the server does not track made calls.
#[tokio::test]
async fn tracking_disabled_test() {
    // Arrange
    let _ = env_logger::try_init();
    let client = Client::start(RestAssuredServerBuilder::new().track_made_calls(false))
        .await
        .unwrap();

    client
        .given(&[ExpectedCall::new("GET", "untracked").body("ok")])
        .await
        .unwrap();
    let response = http_client()
        .get(format!("{}/untracked", client.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Act
    let result = client.verify("GET", "untracked").await;

    // Assert
    match result {
        Err(rest_assured::api::Error::UnexpectedStatus { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("Tracking made calls is disabled"));
        }
        other => panic!("unexpected verification result: {:?}", other),
    }
}
