use crate::{
    common::{
        data::{sanitize_path, stub_key, Call, Callback, ExpectedCall},
        http::HttpClient,
        runtime,
    },
    server::{
        callback::CallbackDispatcher,
        state::Error::{ConfigurationError, NoStubError, TrackingDisabledError, ValidationError},
        store::{CallStore, ExpectedCallStore, ServedStub},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use http::{uri::PathAndQuery, Method, StatusCode};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("No assured calls")]
    NoStubError,
    #[error("Tracking made calls is disabled")]
    TrackingDisabledError,
    #[error("{0}")]
    ConfigurationError(String),
}

/// Operations the HTTP layer performs against the stub engine.
#[async_trait]
pub trait StateManager {
    /// Registers a stub and returns it as stored.
    fn given(&self, stub: ExpectedCall) -> Result<ExpectedCall, Error>;
    /// Registers a callback payload under the callback key carried by `call`.
    fn given_callback(&self, call: Call) -> Result<Call, Error>;
    /// Serves the next stub registered for the method and path of `call`.
    async fn when(&self, call: &Call) -> Result<Call, Error>;
    /// Returns the calls served for `method` and `path`, oldest first.
    fn verify(&self, method: &str, path: &str) -> Result<Vec<Call>, Error>;
    fn clear(&self, call: &Call);
    fn clear_all(&self);
}

pub struct AssuredEndpoints {
    assured_calls: ExpectedCallStore,
    made_calls: CallStore,
    callback_calls: CallStore,
    track_made_calls: bool,
    dispatcher: CallbackDispatcher,
}

impl AssuredEndpoints {
    pub fn new(track_made_calls: bool, http_client: Arc<dyn HttpClient + Send + Sync>) -> Self {
        Self {
            assured_calls: ExpectedCallStore::new(),
            made_calls: CallStore::new(),
            callback_calls: CallStore::new(),
            track_made_calls,
            dispatcher: CallbackDispatcher::new(http_client),
        }
    }
}

#[async_trait]
impl StateManager for AssuredEndpoints {
    fn given(&self, mut stub: ExpectedCall) -> Result<ExpectedCall, Error> {
        validate_method(&stub.method)?;
        stub.path = sanitize_path(&stub.path);
        validate_path(&stub.path)?;

        if stub.status_code == 0 {
            stub.status_code = StatusCode::OK.as_u16();
        }
        StatusCode::from_u16(stub.status_code)
            .map_err(|_| ValidationError(format!("invalid status code {}", stub.status_code)))?;

        if stub.callback_key.as_deref() == Some("") {
            stub.callback_key = None;
        }

        if !stub.callbacks.is_empty() {
            for callback in &stub.callbacks {
                validate_callback(callback)?;
            }

            let callback_key = stub
                .callback_key
                .get_or_insert_with(|| Uuid::new_v4().to_string())
                .clone();

            for callback in &stub.callbacks {
                self.callback_calls
                    .append(&callback_key, callback.to_call(&callback_key));
            }
        }

        tracing::debug!(
            key = %stub.id(),
            callback_key = stub.callback_key.as_deref(),
            "registered stub"
        );

        self.assured_calls.add(stub.clone());
        Ok(stub)
    }

    fn given_callback(&self, call: Call) -> Result<Call, Error> {
        let callback_key = call
            .callback_key()
            .ok_or_else(|| ValidationError("cannot stub callback without key".to_string()))?
            .to_string();

        if call.callback_target().is_none() {
            return Err(ValidationError(
                "cannot stub callback without target".to_string(),
            ));
        }
        validate_method(&call.method)?;

        tracing::debug!(callback_key = callback_key.as_str(), "registered callback");

        self.callback_calls.append(&callback_key, call.clone());
        Ok(call)
    }

    async fn when(&self, call: &Call) -> Result<Call, Error> {
        let key = call.id();

        let served = self.assured_calls.serve(&key).ok_or(NoStubError)?;
        let response = convert_expected_call_to_call(&served)?;
        let stub = served.stub;

        tracing::debug!(key = key.as_str(), status = response.status_code, "serving stub");

        if stub.delay > 0 {
            tracing::debug!(key = key.as_str(), delay = stub.delay, "delaying response");
            runtime::sleep_secs(stub.delay).await;
        }

        if self.track_made_calls {
            self.made_calls.append(&key, response.clone());
        }

        if let Some(callback_key) = &stub.callback_key {
            for callback in self.callback_calls.get(callback_key) {
                self.dispatcher.dispatch(callback);
            }
        }

        Ok(response)
    }

    fn verify(&self, method: &str, path: &str) -> Result<Vec<Call>, Error> {
        if !self.track_made_calls {
            return Err(TrackingDisabledError);
        }

        Ok(self.made_calls.get(&stub_key(method, path)))
    }

    fn clear(&self, call: &Call) {
        if let Some(callback_key) = call.callback_key() {
            tracing::debug!(callback_key, "clearing callbacks");
            self.callback_calls.remove_key(callback_key);
            return;
        }

        let key = call.id();
        tracing::debug!(key = key.as_str(), "clearing stubs and made calls");
        self.assured_calls.remove_all(&key);
        self.made_calls.remove_key(&key);
    }

    fn clear_all(&self) {
        self.assured_calls.clear();
        self.made_calls.clear();
        self.callback_calls.clear();
        tracing::debug!("cleared all stubs, made calls and callbacks");
    }
}

fn convert_expected_call_to_call(served: &ServedStub) -> Result<Call, Error> {
    let stub = &served.stub;

    let response = match &stub.ordered_bodies {
        Some(bodies) => served
            .body_index
            .and_then(|index| bodies.get(index))
            .map(|body| Bytes::from(body.clone()))
            .ok_or_else(|| {
                ConfigurationError("body requested but no ordered bodies found".to_string())
            })?,
        None => stub.response.clone(),
    };

    Ok(Call {
        method: stub.method.clone(),
        path: stub.path.clone(),
        status_code: stub.status_code,
        response,
        headers: stub.headers.clone(),
        delay: stub.delay,
        query: stub.query.clone(),
    })
}

fn validate_method(method: &str) -> Result<(), Error> {
    if method.is_empty() {
        return Err(ValidationError("method is required".to_string()));
    }

    Method::from_bytes(method.as_bytes())
        .map(|_| ())
        .map_err(|_| ValidationError(format!("invalid HTTP method {:?}", method)))
}

fn validate_path(path: &str) -> Result<(), Error> {
    if path.contains(['?', '#']) {
        return Err(ValidationError(format!("invalid path {:?}", path)));
    }

    format!("/{}", path)
        .parse::<PathAndQuery>()
        .map(|_| ())
        .map_err(|_| ValidationError(format!("invalid path {:?}", path)))
}

fn validate_callback(callback: &Callback) -> Result<(), Error> {
    if callback.target.is_empty() {
        return Err(ValidationError(
            "cannot stub callback without target".to_string(),
        ));
    }
    validate_method(&callback.method)
}
