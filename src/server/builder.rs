use crate::{
    common::http::{AssuredHttpClient, HttpClient},
    server::{
        handler::AssuredHandler,
        server::{AssuredServer, AssuredServerConfig},
        state::{AssuredEndpoints, StateManager},
        RestAssuredServer,
    },
};
use std::{error::Error, sync::Arc};

#[cfg(feature = "https")]
use std::path::PathBuf;

/// The `RestAssuredServerBuilder` struct is used to configure the stub server.
/// It provides methods to set the port, network exposure, call tracking and TLS settings.
#[derive(Default)]
pub struct RestAssuredServerBuilder {
    port: Option<u16>,
    expose: Option<bool>,
    track_made_calls: Option<bool>,
    #[cfg(feature = "https")]
    tls_files: Option<(PathBuf, PathBuf)>,
    http_client: Option<Arc<dyn HttpClient + Send + Sync + 'static>>,
}

impl RestAssuredServerBuilder {
    /// Creates a new instance of `RestAssuredServerBuilder` with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the port for the server. Port 0 or no port picks any free port.
    ///
    /// # Parameters
    /// - `port`: The port number.
    ///
    /// # Returns
    /// A modified `RestAssuredServerBuilder` instance for method chaining.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the port for the server as an optional value.
    ///
    /// # Parameters
    /// - `port`: An optional port number.
    ///
    /// # Returns
    /// A modified `RestAssuredServerBuilder` instance for method chaining.
    pub fn port_option(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    /// Sets whether the server listens on all interfaces instead of loopback only.
    ///
    /// # Parameters
    /// - `expose`: A boolean indicating whether to expose the server.
    ///
    /// # Returns
    /// A modified `RestAssuredServerBuilder` instance for method chaining.
    pub fn expose(mut self, expose: bool) -> Self {
        self.expose = Some(expose);
        self
    }

    /// Sets whether served calls are recorded for verification (enabled by default).
    ///
    /// # Parameters
    /// - `enabled`: A boolean indicating whether to record made calls.
    ///
    /// # Returns
    /// A modified `RestAssuredServerBuilder` instance for method chaining.
    pub fn track_made_calls(mut self, enabled: bool) -> Self {
        self.track_made_calls = Some(enabled);
        self
    }

    /// Sets the PEM certificate chain and private key used to serve HTTPS.
    ///
    /// # Parameters
    /// - `cert_path`: The path to the certificate chain file.
    /// - `key_path`: The path to the private key file.
    ///
    /// # Returns
    /// A modified `RestAssuredServerBuilder` instance for method chaining.
    #[cfg(feature = "https")]
    pub fn tls_files<P: Into<PathBuf>>(mut self, cert_path: P, key_path: P) -> Self {
        self.tls_files = Some((cert_path.into(), key_path.into()));
        self
    }

    /// Sets the HTTP client that delivers callbacks.
    ///
    /// # Parameters
    /// - `http_client`: The client implementation.
    ///
    /// # Returns
    /// A modified `RestAssuredServerBuilder` instance for method chaining.
    pub fn http_client(mut self, http_client: Arc<dyn HttpClient + Send + Sync + 'static>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Returns true when the built server will terminate TLS.
    pub fn is_https(&self) -> bool {
        #[cfg(feature = "https")]
        return self.tls_files.is_some();
        #[cfg(not(feature = "https"))]
        return false;
    }

    /// Builds the `RestAssuredServer` with the current settings.
    ///
    /// # Returns
    /// A `RestAssuredServer` instance or an error if the build process fails.
    pub fn build(self) -> Result<RestAssuredServer, Box<dyn Error>> {
        let http_client = match self.http_client.clone() {
            Some(http_client) => http_client,
            None => Arc::new(AssuredHttpClient::new()?),
        };
        let state = AssuredEndpoints::new(self.track_made_calls.unwrap_or(true), http_client);

        self.build_with_state(Arc::new(state))
    }

    /// Builds the server with the current settings and provided state manager.
    ///
    /// # Parameters
    /// - `state`: The state manager to use.
    pub(crate) fn build_with_state<S>(
        self,
        state: Arc<S>,
    ) -> Result<AssuredServer<AssuredHandler<S>>, Box<dyn Error>>
    where
        S: StateManager + Send + Sync + 'static,
    {
        #[cfg(feature = "https")]
        let tls = match &self.tls_files {
            Some((cert_path, key_path)) => Some(crate::server::tls::load_server_config(
                cert_path, key_path,
            )?),
            None => None,
        };

        Ok(AssuredServer::new(
            Box::new(AssuredHandler::new(state)),
            AssuredServerConfig {
                static_port: self.port.filter(|port| *port != 0),
                expose: self.expose.unwrap_or(false),
                #[cfg(feature = "https")]
                tls,
            },
        ))
    }
}
