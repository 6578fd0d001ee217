use std::time::Duration;
use tokio::runtime::Runtime;

pub(crate) async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await
}

/// Sleeps for `seconds`, skipping the timer entirely for zero.
pub(crate) async fn sleep_secs(seconds: u64) {
    if seconds > 0 {
        sleep(Duration::from_secs(seconds)).await
    }
}

/// Runtime that drives a background server thread. Callback tasks are spawned onto it as well.
pub(crate) fn new_current_thread() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}
