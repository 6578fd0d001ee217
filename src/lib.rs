//! `rest_assured` is an HTTP test double. Tests register ("stub") responses for an HTTP method
//! and path, point the system under test at the stub server and finally verify which calls were
//! made.
//!
//! The server exposes a small HTTP interface:
//!
//! | Route               | Purpose                                                           |
//! |---------------------|-------------------------------------------------------------------|
//! | `/given/{path}`     | registers a stub for the request method and `path`                |
//! | `/callback`         | registers a callback payload under an `assured-callback-key`      |
//! | `/when/{path}`      | serves the next stub registered for the request method and `path` |
//! | `/verify/{path}`    | lists the calls served for the request method and `path`         |
//! | `/clear/{path}`     | removes stubs and made calls for the request method and `path`    |
//! | `DELETE /clear`     | removes everything                                                |
//!
//! Stubs registered for the same method and path are served round robin. Metadata travels in
//! `assured-*` headers: `assured-status`, `assured-delay`, `assured-ordered-body`,
//! `assured-callback-key`, `assured-callback-target` and `assured-callback-delay`.
//! `assured-ordered-body` values are base64 encoded.
//!
//! # Getting Started
//! ```no_run
//! use rest_assured::{Callback, Client, ExpectedCall, RestAssuredServerBuilder};
//!
//! # async fn run() -> Result<(), rest_assured::api::Error> {
//! let client = Client::start(RestAssuredServerBuilder::new()).await?;
//!
//! client
//!     .given(&[
//!         ExpectedCall::new("POST", "orders")
//!             .status(201)
//!             .body(r#"{"id": 7}"#)
//!             .callback(Callback::new("POST", "http://localhost:8080/hooks/orders").delay(1)),
//!         ExpectedCall::new("POST", "orders").status(409),
//!     ])
//!     .await?;
//!
//! // the system under test now talks to `client.url()`, e.g. POST {url}/orders
//!
//! let made_calls = client.verify("POST", "orders").await?;
//! assert!(made_calls.len() <= 2);
//! # Ok(())
//! # }
//! ```
//!
//! # Standalone Mode
//! With the `standalone` feature the crate builds a `rest-assured` binary that serves the same
//! interface on port 11011 (see `rest-assured --help`). The `https` feature adds TLS for the
//! server and for outgoing callbacks.
pub mod api;
pub mod common;
pub mod server;

pub use api::Client;
pub use common::data::{Call, Callback, ExpectedCall};
pub use server::RestAssuredServerBuilder;
