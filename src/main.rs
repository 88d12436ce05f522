use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use url_to_s3::cli::Cli;
use url_to_s3::store::S3Store;
use url_to_s3::{summary, transfer};

#[tokio::main]
async fn main() {
    // diagnostics go to stderr; stdout is reserved for the key=value outputs
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "url_to_s3=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let request = Cli::parse().into_request();
    let store = S3Store::from_env().await;

    match transfer::run(&request, &store).await {
        Ok(result) => {
            summary::print_success(&request.url, &result);
            summary::emit_outputs(&result);
        }
        Err(err) => {
            tracing::error!(%err, "transfer failed");
            summary::print_failure(&request.url, &request.destination.url(), &err);
            std::process::exit(1);
        }
    }
}
