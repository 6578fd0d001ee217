use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
#[cfg(feature = "https")]
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot send request: {0}")]
    HyperError(#[from] hyper::Error),
    #[error("cannot send request: {0}")]
    HyperUtilError(#[from] hyper_util::client::legacy::Error),
    #[error("request URI must be absolute: {0}")]
    RelativeUri(String),
    #[cfg(feature = "https")]
    #[error("cannot load native root certificates: {0}")]
    RootCertificates(std::io::Error),
}

/// Sends fully buffered HTTP requests. Used for callback dispatch and by the client library.
#[async_trait]
pub trait HttpClient {
    async fn send(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error>;
}

pub struct AssuredHttpClient {
    #[cfg(feature = "https")]
    client: Arc<Client<HttpsConnector<HttpConnector>, Full<Bytes>>>,
    #[cfg(not(feature = "https"))]
    client: Arc<Client<HttpConnector, Full<Bytes>>>,
}

impl AssuredHttpClient {
    #[cfg(feature = "https")]
    pub fn new() -> Result<Self, Error> {
        // see https://github.com/rustls/rustls/issues/1938
        if rustls::crypto::CryptoProvider::get_default().is_none() {
            let _ = rustls::crypto::ring::default_provider().install_default();
        }

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(Error::RootCertificates)?
            .https_or_http()
            .enable_http1()
            .build();

        Ok(Self {
            client: Arc::new(Client::builder(TokioExecutor::new()).build(https_connector)),
        })
    }

    #[cfg(not(feature = "https"))]
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            client: Arc::new(Client::builder(TokioExecutor::new()).build(HttpConnector::new())),
        })
    }
}

#[async_trait]
impl HttpClient for AssuredHttpClient {
    async fn send(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let (mut req_parts, req_body) = req.into_parts();

        if req_parts.uri.scheme().is_none() || req_parts.uri.authority().is_none() {
            return Err(Error::RelativeUri(req_parts.uri.to_string()));
        }

        // hyper derives the Host header from the absolute URI
        req_parts.headers.remove(http::header::HOST);
        let hyper_req = Request::from_parts(req_parts, Full::new(req_body));

        let res = self.client.request(hyper_req).await?;

        let (res_parts, res_body) = res.into_parts();
        let body = res_body.collect().await?.to_bytes();

        Ok(Response::from_parts(res_parts, body))
    }
}
