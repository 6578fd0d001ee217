use rest_assured::{Client, ExpectedCall, RestAssuredServerBuilder};
use std::time::{Duration, Instant};

/// A delayed stub answers only after its delay has passed.
#[tokio::test]
async fn delay_test() {
    // Arrange
    let _ = env_logger::try_init();
    let client = Client::start(RestAssuredServerBuilder::new()).await.unwrap();
    let delay = Duration::from_secs(2);

    client
        .given(&[ExpectedCall::new("GET", "y").delay(2).status(202)])
        .await
        .unwrap();

    // Act
    let start_time = Instant::now();
    let response = reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
        .get(format!("{}/y", client.url()))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), 202);
    assert!(start_time.elapsed() >= delay);
}

/// A delayed stub does not hold back requests for other keys.
#[tokio::test]
async fn delay_does_not_block_other_keys_test() {
    // Arrange
    let _ = env_logger::try_init();
    let client = Client::start(RestAssuredServerBuilder::new()).await.unwrap();
    let http_client = reqwest::Client::builder().no_proxy().build().unwrap();

    client
        .given(&[
            ExpectedCall::new("GET", "slow").delay(3),
            ExpectedCall::new("GET", "fast"),
        ])
        .await
        .unwrap();

    // Act
    let slow = tokio::spawn(http_client.get(format!("{}/slow", client.url())).send());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let start_time = Instant::now();
    let fast = http_client
        .get(format!("{}/fast", client.url()))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(fast.status(), 200);
    assert!(start_time.elapsed() < Duration::from_secs(2));
    assert_eq!(slow.await.unwrap().unwrap().status(), 200);
}
