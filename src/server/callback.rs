use crate::common::{
    data::Call,
    http::{Error as HttpClientError, HttpClient},
    runtime,
};
use bytes::Bytes;
use http::{Method, Request};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("callback has no target")]
    MissingTarget,
    #[error("invalid callback method: {0}")]
    InvalidMethod(#[from] http::method::InvalidMethod),
    #[error("cannot build callback request: {0}")]
    RequestError(#[from] http::Error),
    #[error("cannot deliver callback: {0}")]
    HttpClientError(#[from] HttpClientError),
}

/// Fire-and-forget delivery of callback calls. Every callback runs in its own task; failures are
/// logged and dropped.
#[derive(Clone)]
pub struct CallbackDispatcher {
    http_client: Arc<dyn HttpClient + Send + Sync>,
}

impl CallbackDispatcher {
    pub fn new(http_client: Arc<dyn HttpClient + Send + Sync>) -> Self {
        Self { http_client }
    }

    /// Schedules `call` to be sent to its target once its delay has passed.
    pub fn dispatch(&self, call: Call) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(error = %err, "no async runtime available, dropping callback");
                return;
            }
        };

        let http_client = self.http_client.clone();
        handle.spawn(async move {
            runtime::sleep_secs(call.delay).await;

            if let Err(err) = send_callback(http_client.as_ref(), &call).await {
                tracing::warn!(
                    target_url = call.callback_target().unwrap_or_default(),
                    error = %err,
                    "callback failed"
                );
            }
        });
    }
}

pub(crate) async fn send_callback(
    http_client: &(dyn HttpClient + Send + Sync),
    call: &Call,
) -> Result<(), Error> {
    let target = call.callback_target().ok_or(Error::MissingTarget)?;
    let method = Method::from_bytes(call.method.as_bytes())?;

    let mut builder = Request::builder().method(method).uri(target);
    for (name, value) in call.replayable_headers() {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let request: Request<Bytes> = builder.body(call.response.clone())?;

    let response = http_client.send(request).await?;
    tracing::debug!(
        target_url = target,
        status = response.status().as_u16(),
        "callback delivered"
    );

    Ok(())
}
