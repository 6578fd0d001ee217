mod builder;
pub(crate) mod callback;
pub(crate) mod handler;
#[allow(clippy::module_inception)]
pub(crate) mod server;
pub(crate) mod state;
pub mod store;
#[cfg(feature = "https")]
mod tls;

use crate::server::{handler::AssuredHandler, server::AssuredServer};

pub use builder::RestAssuredServerBuilder;
pub use server::Error;
pub use state::{AssuredEndpoints, Error as StateError, StateManager};

/// The stub server as assembled by [`RestAssuredServerBuilder::build`].
pub type RestAssuredServer = AssuredServer<AssuredHandler<AssuredEndpoints>>;
