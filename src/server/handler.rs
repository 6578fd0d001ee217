use crate::{
    common::data::{
        decode_ordered_body, is_metadata_header, is_transport_header, sanitize_path, Call,
        ErrorResponse, ExpectedCall,
        ASSURED_CALLBACK_DELAY, ASSURED_CALLBACK_KEY, ASSURED_DELAY, ASSURED_ORDERED_BODY,
        ASSURED_STATUS,
    },
    server::{
        handler::Error::{
            InvalidHeader, InvalidMetadata, RequestConversionError, ResponseBodySerializeError,
            ResponseConversionError, StateManagerError,
        },
        state,
        state::StateManager,
    },
};
use async_trait::async_trait;
use http::{HeaderMap, Method, Request, Response, StatusCode};
use hyper::body::Bytes;
use path_tree::{Path, PathTree};
use serde::Serialize;
use std::{collections::BTreeMap, fmt::Display, str::FromStr, sync::Arc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid value {1:?} for header {0}")]
    InvalidMetadata(&'static str, String),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("cannot convert request to internal data structure: {0}")]
    RequestConversionError(String),
    #[error("cannot serialize response body: {0}")]
    ResponseBodySerializeError(serde_json::Error),
    #[error("cannot convert response: {0}")]
    ResponseConversionError(http::Error),
    #[error("invalid status code: {0}")]
    InvalidStatusCode(#[from] http::status::InvalidStatusCode),
    #[error(transparent)]
    StateManagerError(#[from] state::Error),
}

impl Error {
    /// Status code reported to the client when a request fails with this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            StateManagerError(state::Error::ValidationError(_))
            | StateManagerError(state::Error::TrackingDisabledError)
            | InvalidMetadata(..)
            | InvalidHeader(_)
            | RequestConversionError(_) => StatusCode::BAD_REQUEST,
            StateManagerError(state::Error::NoStubError) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

enum RoutePath {
    Given,
    Callback,
    When,
    Verify,
    Clear,
}

impl RoutePath {
    fn prefix(&self) -> &'static str {
        match self {
            RoutePath::Given => "/given",
            RoutePath::Callback => "/callback",
            RoutePath::When => "/when",
            RoutePath::Verify => "/verify",
            RoutePath::Clear => "/clear",
        }
    }
}

#[async_trait]
pub trait Handler {
    async fn handle(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error>;
}

pub struct AssuredHandler<S>
where
    S: StateManager + Send + Sync + 'static,
{
    path_tree: PathTree<RoutePath>,
    state: Arc<S>,
}

#[async_trait]
impl<S> Handler for AssuredHandler<S>
where
    S: StateManager + Send + Sync + 'static,
{
    async fn handle(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        tracing::trace!("Routing incoming request: {} {}", req.method(), req.uri());

        match self.route(req).await {
            Ok(res) => Ok(res),
            Err(err) => {
                let status = err.status_code();
                if status.is_server_error() {
                    tracing::error!("failed to process request: {}", err);
                } else {
                    tracing::debug!("rejected request: {}", err);
                }
                response(status, Some(ErrorResponse::new(&err)))
            }
        }
    }
}

impl<S> AssuredHandler<S>
where
    S: StateManager + Send + Sync + 'static,
{
    pub fn new(state: Arc<S>) -> Self {
        let mut path_tree: PathTree<RoutePath> = PathTree::new();
        #[allow(unused_must_use)]
        {
            path_tree.insert("/given", RoutePath::Given);
            path_tree.insert("/given/:path*", RoutePath::Given);
            path_tree.insert("/callback", RoutePath::Callback);
            path_tree.insert("/when", RoutePath::When);
            path_tree.insert("/when/:path*", RoutePath::When);
            path_tree.insert("/verify", RoutePath::Verify);
            path_tree.insert("/verify/:path*", RoutePath::Verify);
            path_tree.insert("/clear", RoutePath::Clear);
            path_tree.insert("/clear/:path*", RoutePath::Clear);
        }

        Self { path_tree, state }
    }

    async fn route(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let path = req.uri().path().to_string();
        let lookup = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };

        let (route, params) = match self.path_tree.find(lookup) {
            Some(found) => found,
            None => {
                return response(
                    StatusCode::NOT_FOUND,
                    Some(ErrorResponse::new(&"Request did not match any route")),
                )
            }
        };

        let stub_path = stub_path(&path, route.prefix(), params);

        match route {
            RoutePath::Given => self.handle_given(req, stub_path),
            RoutePath::Callback => self.handle_given_callback(req),
            RoutePath::When => self.handle_when(req, stub_path).await,
            RoutePath::Verify => self.handle_verify(req, stub_path),
            RoutePath::Clear if req.method() == Method::DELETE && stub_path.is_empty() => {
                self.handle_clear_all()
            }
            RoutePath::Clear => self.handle_clear(req, stub_path),
        }
    }

    fn handle_given(&self, req: Request<Bytes>, path: String) -> Result<Response<Bytes>, Error> {
        let stub = expected_call_from_request(req, path)?;
        let stub = self.state.given(stub)?;

        tracing::info!(
            "Registered stub {} (status {}, delay {}s)",
            stub.id(),
            stub.status_code,
            stub.delay
        );

        response(StatusCode::OK, Some(stub))
    }

    fn handle_given_callback(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let callback = call_from_request(req, String::new())?;
        let callback = self.state.given_callback(callback)?;

        tracing::info!(
            "Registered callback {} {} for key {}",
            callback.method,
            callback.callback_target().unwrap_or_default(),
            callback.callback_key().unwrap_or_default()
        );

        response(StatusCode::OK, Some(callback))
    }

    async fn handle_when(
        &self,
        req: Request<Bytes>,
        path: String,
    ) -> Result<Response<Bytes>, Error> {
        let call = call_from_request(req, path)?;
        let served = self.state.when(&call).await?;

        let mut builder = Response::builder().status(StatusCode::from_u16(served.status_code)?);
        for (name, value) in served.replayable_headers() {
            if !is_transport_header(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }

        builder
            .body(served.response)
            .map_err(ResponseConversionError)
    }

    fn handle_verify(&self, req: Request<Bytes>, path: String) -> Result<Response<Bytes>, Error> {
        let made_calls = self.state.verify(req.method().as_str(), &path)?;
        response(StatusCode::OK, Some(made_calls))
    }

    fn handle_clear(&self, req: Request<Bytes>, path: String) -> Result<Response<Bytes>, Error> {
        let call = call_from_request(req, path)?;
        self.state.clear(&call);
        response::<()>(StatusCode::OK, None)
    }

    fn handle_clear_all(&self) -> Result<Response<Bytes>, Error> {
        self.state.clear_all();
        tracing::info!("Cleared all stubs, made calls and callbacks");
        response::<()>(StatusCode::OK, None)
    }
}

/// The stub path addressed by a request: the `path` route parameter, or whatever follows the
/// route prefix when the parameter is absent.
fn stub_path(raw_path: &str, prefix: &str, params: Path) -> String {
    for (name, value) in params.params() {
        if name.eq("path") {
            return sanitize_path(value);
        }
    }

    sanitize_path(raw_path.strip_prefix(prefix).unwrap_or_default())
}

fn expected_call_from_request(req: Request<Bytes>, path: String) -> Result<ExpectedCall, Error> {
    let (parts, body) = req.into_parts();

    let ordered_bodies = ordered_bodies(&parts.headers)?;
    let query = extract_query_params(&parts.uri)?;
    let status_code = metadata_number::<u16>(&parts.headers, ASSURED_STATUS)?.unwrap_or(0);
    let delay = metadata_number::<u64>(&parts.headers, ASSURED_DELAY)?.unwrap_or(0);
    let callback_key = metadata_value(&parts.headers, ASSURED_CALLBACK_KEY)?;

    let headers = headers_to_map(&parts.headers)?
        .into_iter()
        .filter(|(name, _)| !is_metadata_header(name))
        .collect();

    Ok(ExpectedCall {
        path,
        method: parts.method.to_string(),
        status_code,
        delay,
        headers,
        ordered_bodies,
        query,
        response: body,
        callbacks: Vec::new(),
        callback_key,
    })
}

/// Converts a request into a call record. Metadata headers are kept so that callback keys and
/// targets travel with the record. For callback registrations the delay comes from
/// `assured-callback-delay`.
fn call_from_request(req: Request<Bytes>, path: String) -> Result<Call, Error> {
    let (parts, body) = req.into_parts();

    let query = extract_query_params(&parts.uri)?;
    let delay = metadata_number::<u64>(&parts.headers, ASSURED_CALLBACK_DELAY)?.unwrap_or(0);
    let headers = headers_to_map(&parts.headers)?;

    Ok(Call {
        method: parts.method.to_string(),
        path,
        status_code: 0,
        response: body,
        headers,
        delay,
        query,
    })
}

fn metadata_value(headers: &HeaderMap, name: &'static str) -> Result<Option<String>, Error> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|e| InvalidHeader(format!("{}: {}", name, e)))?
                .trim();
            Ok(Some(value.to_string()).filter(|v| !v.is_empty()))
        }
    }
}

fn metadata_number<T>(headers: &HeaderMap, name: &'static str) -> Result<Option<T>, Error>
where
    T: FromStr,
    T::Err: Display,
{
    match metadata_value(headers, name)? {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| InvalidMetadata(name, value)),
    }
}

fn ordered_bodies(headers: &HeaderMap) -> Result<Option<Vec<String>>, Error> {
    let bodies = headers
        .get_all(ASSURED_ORDERED_BODY)
        .iter()
        .map(|value| {
            let value = value
                .to_str()
                .map_err(|e| InvalidHeader(format!("{}: {}", ASSURED_ORDERED_BODY, e)))?;
            decode_ordered_body(value)
                .ok_or_else(|| InvalidMetadata(ASSURED_ORDERED_BODY, value.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(bodies).filter(|bodies| !bodies.is_empty()))
}

fn response<T>(status: StatusCode, body: Option<T>) -> Result<Response<Bytes>, Error>
where
    T: Serialize,
{
    let mut builder = Response::builder().status(status);

    if let Some(body_obj) = body {
        builder = builder.header("content-type", "application/json");

        let body_bytes = serde_json::to_vec(&body_obj).map_err(ResponseBodySerializeError)?;

        return builder
            .body(Bytes::from(body_bytes))
            .map_err(ResponseConversionError);
    }

    builder.body(Bytes::new()).map_err(ResponseConversionError)
}

fn extract_query_params(uri: &http::Uri) -> Result<BTreeMap<String, String>, Error> {
    // The `url` crate only parses complete URLs, so the query is attached to a placeholder.
    let url = format!("http://placeholder?{}", uri.query().unwrap_or(""));
    let url = url::Url::parse(&url).map_err(|e| RequestConversionError(e.to_string()))?;

    Ok(url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect())
}

fn headers_to_map(headers: &HeaderMap) -> Result<BTreeMap<String, String>, Error> {
    headers
        .iter()
        .filter(|(name, _)| !is_transport_header(name.as_str()))
        .filter(|(name, _)| name.as_str() != ASSURED_ORDERED_BODY)
        .map(|(name, value)| {
            let value = value
                .to_str()
                .map_err(|e| InvalidHeader(format!("{}: {}", name, e)))?;
            Ok((name.as_str().to_string(), value.to_string()))
        })
        .collect()
}
