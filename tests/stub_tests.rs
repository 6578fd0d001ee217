use rest_assured::{Client, ExpectedCall, RestAssuredServerBuilder};

fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Stubs registered for the same method and path are served round robin.
#[tokio::test]
async fn round_robin_test() {
    // Arrange
    let _ = env_logger::try_init();
    let client = Client::start(RestAssuredServerBuilder::new()).await.unwrap();

    client
        .given(&[
            ExpectedCall::new("GET", "x").status(200).body("A"),
            ExpectedCall::new("GET", "x").status(200).body("B"),
        ])
        .await
        .unwrap();

    // Act
    let http_client = http_client();
    let mut bodies = Vec::new();
    for _ in 0..3 {
        let response = http_client
            .get(format!("{}/x", client.url()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        bodies.push(response.text().await.unwrap());
    }

    // Assert
    assert_eq!(bodies, vec!["A", "B", "A"]);
}

/// Status, headers and body of a stub are replayed. Registration metadata is not.
#[tokio::test]
async fn stub_response_test() {
    // Arrange
    let _ = env_logger::try_init();
    let client = Client::start(RestAssuredServerBuilder::new()).await.unwrap();

    client
        .given(&[ExpectedCall::new("POST", "/teapot/assured/")
            .status(418)
            .header("x-brew", "earl grey")
            .body(r#"{"assured": true}"#)])
        .await
        .unwrap();

    // Act
    let response = http_client()
        .post(format!("{}/teapot/assured", client.url()))
        .body("ignored")
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), 418);
    assert_eq!(response.headers()["x-brew"], "earl grey");
    assert!(response.headers().get("assured-status").is_none());
    assert_eq!(response.text().await.unwrap(), r#"{"assured": true}"#);
}

/// Methods are part of the stub key, and unknown keys are reported as not found.
#[tokio::test]
async fn method_is_part_of_key_test() {
    // Arrange
    let _ = env_logger::try_init();
    let client = Client::start(RestAssuredServerBuilder::new()).await.unwrap();

    client
        .given(&[ExpectedCall::new("", "users").body("listing")])
        .await
        .unwrap();

    // Act
    let http_client = http_client();
    let get = http_client
        .get(format!("{}/users", client.url()))
        .send()
        .await
        .unwrap();
    let delete = http_client
        .delete(format!("{}/users", client.url()))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(get.status(), 200);
    assert_eq!(get.text().await.unwrap(), "listing");
    assert_eq!(delete.status(), 404);
    let error: serde_json::Value = serde_json::from_str(&delete.text().await.unwrap()).unwrap();
    assert_eq!(error["message"], "No assured calls");
}

/// A stub with ordered bodies serves them one after the other, starting over at the end.
#[tokio::test]
async fn ordered_bodies_test() {
    // Arrange
    let _ = env_logger::try_init();
    let client = Client::start(RestAssuredServerBuilder::new()).await.unwrap();

    client
        .given(&[ExpectedCall::new("GET", "pages").ordered_bodies(vec!["first", "second"])])
        .await
        .unwrap();

    // Act
    let http_client = http_client();
    let mut bodies = Vec::new();
    for _ in 0..3 {
        let response = http_client
            .get(format!("{}/pages", client.url()))
            .send()
            .await
            .unwrap();
        bodies.push(response.text().await.unwrap());
    }

    // Assert
    assert_eq!(bodies, vec!["first", "second", "first"]);
}

/// Ordered bodies keep line breaks, non-ASCII text and surrounding whitespace.
#[tokio::test]
async fn ordered_bodies_keep_their_content_test() {
    // Arrange
    let _ = env_logger::try_init();
    let client = Client::start(RestAssuredServerBuilder::new()).await.unwrap();
    let variants = vec!["{\n  \"a\": 1\n}", "héllo", "  padded  "];

    client
        .given(&[ExpectedCall::new("GET", "z").ordered_bodies(variants.clone())])
        .await
        .unwrap();

    // Act
    let http_client = http_client();
    let mut bodies = Vec::new();
    for _ in 0..variants.len() {
        let response = http_client
            .get(format!("{}/z", client.url()))
            .send()
            .await
            .unwrap();
        bodies.push(response.text().await.unwrap());
    }

    // Assert
    assert_eq!(bodies, variants);
}

/// Clearing a key removes its stubs while other keys keep working. Clearing everything empties
/// the server.
#[tokio::test]
async fn clear_test() {
    // Arrange
    let _ = env_logger::try_init();
    let client = Client::start(RestAssuredServerBuilder::new()).await.unwrap();
    let http_client = http_client();

    client
        .given(&[
            ExpectedCall::new("GET", "a").body("a"),
            ExpectedCall::new("GET", "b").body("b"),
        ])
        .await
        .unwrap();

    // Act
    client.clear("GET", "a").await.unwrap();

    // Assert
    let status = |path: &'static str| {
        let request = http_client.get(format!("{}/{}", client.url(), path));
        async move { request.send().await.unwrap().status() }
    };
    assert_eq!(status("a").await, 404);
    assert_eq!(status("b").await, 200);

    client.clear_all().await.unwrap();
    assert_eq!(status("b").await, 404);
}

/// A server started on a fixed port can be reached there.
#[tokio::test]
async fn static_port_test() {
    // Arrange
    let _ = env_logger::try_init();
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    // Act
    let client = Client::start(RestAssuredServerBuilder::new().port(port))
        .await
        .unwrap();

    // Assert
    assert_eq!(client.port(), port);
    assert_eq!(client.url(), format!("http://127.0.0.1:{}/when", port));
}
