use crate::{
    api::client::Error::{
        BuildError, HttpClientError, MissingCallbackTarget, RequestError, StartError,
        UnexpectedStatus,
    },
    common::{
        data::{
            encode_ordered_body, sanitize_path, Call, Callback, ExpectedCall, ASSURED_CALLBACK_DELAY,
            ASSURED_CALLBACK_KEY, ASSURED_CALLBACK_TARGET, ASSURED_DELAY, ASSURED_ORDERED_BODY,
            ASSURED_STATUS,
        },
        http::{AssuredHttpClient, HttpClient},
        runtime,
    },
    server::RestAssuredServerBuilder,
};
use bytes::Bytes;
use http::{Method, Request, Response};
use std::{
    net::SocketAddr,
    sync::Arc,
    thread::{self, JoinHandle},
};
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot build server: {0}")]
    BuildError(String),
    #[error("cannot start server: {0}")]
    StartError(String),
    #[error("callback of stub {0} has no target")]
    MissingCallbackTarget(String),
    #[error("cannot build request: {0}")]
    RequestError(#[from] http::Error),
    #[error("cannot reach server: {0}")]
    HttpClientError(#[from] crate::common::http::Error),
    #[error("server responded with status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    #[error("cannot deserialize server response: {0}")]
    DeserializeError(#[from] serde_json::Error),
}

/// Drives a stub server that runs on a background thread.
///
/// ```no_run
/// use rest_assured::{Client, ExpectedCall, RestAssuredServerBuilder};
///
/// # async fn run() -> Result<(), rest_assured::api::Error> {
/// let client = Client::start(RestAssuredServerBuilder::new()).await?;
/// client
///     .given(&[ExpectedCall::new("GET", "users/1").body(r#"{"id": 1}"#)])
///     .await?;
///
/// // point the system under test at `client.url()` and exercise it
///
/// let made_calls = client.verify("GET", "users/1").await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    addr: SocketAddr,
    scheme: &'static str,
    http_client: Arc<dyn HttpClient + Send + Sync>,
    shutdown: Option<oneshot::Sender<()>>,
    server_thread: Option<JoinHandle<Result<(), String>>>,
}

impl Client {
    /// Builds the server, starts it on its own thread and returns once it accepts connections.
    pub async fn start(builder: RestAssuredServerBuilder) -> Result<Self, Error> {
        let scheme = if builder.is_https() { "https" } else { "http" };
        let server = builder.build().map_err(|err| BuildError(err.to_string()))?;
        let http_client = AssuredHttpClient::new()?;

        let (addr_sender, addr_receiver) = oneshot::channel::<SocketAddr>();
        let (shutdown_sender, shutdown_receiver) = oneshot::channel::<()>();

        let server_thread = thread::Builder::new()
            .name("rest-assured-server".to_string())
            .spawn(move || {
                let runtime = runtime::new_current_thread().map_err(|err| err.to_string())?;
                let shutdown = async {
                    let _ = shutdown_receiver.await;
                };

                runtime
                    .block_on(server.start_with_signals(Some(addr_sender), shutdown))
                    .map_err(|err| err.to_string())
            })
            .map_err(|err| StartError(err.to_string()))?;

        let addr = match addr_receiver.await {
            Ok(addr) => addr,
            Err(_) => {
                let reason = match server_thread.join() {
                    Ok(Err(reason)) => reason,
                    Ok(Ok(())) => "server stopped before listening".to_string(),
                    Err(_) => "server thread panicked".to_string(),
                };
                return Err(StartError(reason));
            }
        };

        Ok(Self {
            addr,
            scheme,
            http_client: Arc::new(http_client),
            shutdown: Some(shutdown_sender),
            server_thread: Some(server_thread),
        })
    }

    /// Replaces the HTTP client used to talk to the server, e.g. one that trusts a self-signed
    /// certificate.
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient + Send + Sync>) -> Self {
        self.http_client = http_client;
        self
    }

    /// Port the server listens on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Base URL that the system under test should call. Stubbed paths are appended to it.
    pub fn url(&self) -> String {
        format!("{}/when", self.base_url())
    }

    fn base_url(&self) -> String {
        format!("{}://127.0.0.1:{}", self.scheme, self.addr.port())
    }

    /// Registers stubs in order. A stub without a method is registered for `GET`.
    ///
    /// When a stub carries callbacks, its callback key (or a fresh one if it has none) links the
    /// stub to the callbacks registered through `/callback`.
    pub async fn given(&self, calls: &[ExpectedCall]) -> Result<(), Error> {
        let base_url = self.base_url();

        for call in calls {
            let mut call = call.clone();
            if call.method.is_empty() {
                call.method = Method::GET.to_string();
            }
            call.path = sanitize_path(&call.path);

            if call.callbacks.iter().any(|callback| callback.target.is_empty()) {
                return Err(MissingCallbackTarget(call.id()));
            }

            let callback_key = callback_key(&call);

            let request = stub_request(&base_url, &call, callback_key.as_deref())?;
            self.send(request).await?;

            if let Some(callback_key) = &callback_key {
                for callback in &call.callbacks {
                    let request = callback_request(&base_url, callback, callback_key)?;
                    self.send(request).await?;
                }
            }

            tracing::debug!("registered stub {}", call.id());
        }

        Ok(())
    }

    /// Calls that were served for `method` and `path`, oldest first.
    pub async fn verify(&self, method: &str, path: &str) -> Result<Vec<Call>, Error> {
        let request = Request::builder()
            .method(method)
            .uri(format!("{}/verify/{}", self.base_url(), sanitize_path(path)))
            .body(Bytes::new())?;

        let response = self.send(request).await?;
        Ok(serde_json::from_slice(response.body())?)
    }

    /// Removes the stubs and made calls registered for `method` and `path`.
    pub async fn clear(&self, method: &str, path: &str) -> Result<(), Error> {
        let request = Request::builder()
            .method(method)
            .uri(format!("{}/clear/{}", self.base_url(), sanitize_path(path)))
            .body(Bytes::new())?;

        self.send(request).await.map(|_| ())
    }

    /// Removes every stub, made call and callback.
    pub async fn clear_all(&self) -> Result<(), Error> {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri(format!("{}/clear", self.base_url()))
            .body(Bytes::new())?;

        self.send(request).await.map(|_| ())
    }

    /// Signals the server to stop accepting connections.
    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(server_thread) = self.server_thread.take() {
            if server_thread.is_finished() {
                if let Ok(Err(reason)) = server_thread.join() {
                    tracing::warn!("server stopped with error: {}", reason);
                }
            }
        }
    }

    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let response = self.http_client.send(request).await.map_err(HttpClientError)?;

        if !response.status().is_success() {
            return Err(UnexpectedStatus {
                status: response.status().as_u16(),
                body: String::from_utf8_lossy(response.body()).into_owned(),
            });
        }

        Ok(response)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

/// The caller's callback key if it has one, otherwise a fresh key when the stub has callbacks.
fn callback_key(call: &ExpectedCall) -> Option<String> {
    match &call.callback_key {
        Some(key) if !key.is_empty() => Some(key.clone()),
        _ if call.callbacks.is_empty() => None,
        _ => Some(Uuid::new_v4().to_string()),
    }
}

fn stub_request(
    base_url: &str,
    call: &ExpectedCall,
    callback_key: Option<&str>,
) -> Result<Request<Bytes>, Error> {
    let mut uri = format!("{}/given/{}", base_url, call.path);
    if !call.query.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&call.query)
            .finish();
        uri = format!("{}?{}", uri, query);
    }

    let mut builder = Request::builder().method(call.method.as_str()).uri(uri);

    for (name, value) in &call.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if call.status_code != 0 {
        builder = builder.header(ASSURED_STATUS, call.status_code);
    }
    if call.delay > 0 {
        builder = builder.header(ASSURED_DELAY, call.delay);
    }
    for body in call.ordered_bodies.iter().flatten() {
        builder = builder.header(ASSURED_ORDERED_BODY, encode_ordered_body(body));
    }
    if let Some(callback_key) = callback_key {
        builder = builder.header(ASSURED_CALLBACK_KEY, callback_key);
    }

    builder.body(call.response.clone()).map_err(RequestError)
}

fn callback_request(
    base_url: &str,
    callback: &Callback,
    callback_key: &str,
) -> Result<Request<Bytes>, Error> {
    let method = if callback.method.is_empty() {
        Method::POST.as_str()
    } else {
        callback.method.as_str()
    };

    let mut builder = Request::builder()
        .method(method)
        .uri(format!("{}/callback", base_url));

    for (name, value) in &callback.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder = builder
        .header(ASSURED_CALLBACK_KEY, callback_key)
        .header(ASSURED_CALLBACK_TARGET, callback.target.as_str());
    if callback.delay > 0 {
        builder = builder.header(ASSURED_CALLBACK_DELAY, callback.delay);
    }

    builder.body(callback.response.clone()).map_err(RequestError)
}
