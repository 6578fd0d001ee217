use clap::{ArgAction, Parser};
use rest_assured::RestAssuredServerBuilder;
use std::{error::Error, path::PathBuf};
use tracing_subscriber::EnvFilter;

/// Holds command line parameters provided by the user.
#[derive(Parser, Debug)]
#[command(
    name = "rest-assured",
    about = "HTTP test double: stub responses, exercise them and verify the calls that were made",
    version
)]
struct Args {
    /// Port the server listens on.
    #[arg(short, long, env = "ASSURED_PORT", default_value_t = 11011)]
    port: u16,

    /// Listen on all interfaces instead of 127.0.0.1 only.
    #[arg(short, long, env = "ASSURED_EXPOSE")]
    expose: bool,

    /// Record served calls so that they can be verified.
    #[arg(long, env = "ASSURED_TRACK_MADE_CALLS", default_value_t = true, action = ArgAction::Set)]
    track_made_calls: bool,

    /// PEM certificate chain used to serve HTTPS. Requires --tls-key.
    #[arg(long, env = "ASSURED_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// PEM private key used to serve HTTPS. Requires --tls-cert.
    #[arg(long, env = "ASSURED_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rest_assured=info")),
        )
        .init();

    let args = Args::parse();

    tracing::info!(
        "Starting {} server V{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let builder = RestAssuredServerBuilder::new()
        .port(args.port)
        .expose(args.expose)
        .track_made_calls(args.track_made_calls);

    #[cfg(feature = "https")]
    let builder = match (args.tls_cert, args.tls_key) {
        (Some(cert), Some(key)) => builder.tls_files(cert, key),
        _ => builder,
    };

    #[cfg(not(feature = "https"))]
    {
        if args.tls_cert.is_some() || args.tls_key.is_some() {
            return Err("TLS files require the `https` feature".into());
        }
    }

    let server = builder.build()?;

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("cannot listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down");
    };

    server.start_with_signals(None, shutdown).await?;

    Ok(())
}
