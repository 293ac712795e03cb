//! gitprovider command-line entry point.

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use gitprovider::cli::{self, Cli};
use gitprovider::CallContext;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // RUST_LOG wins over --debug
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if cli.debug => EnvFilter::new("gitprovider=debug"),
        Err(_) => EnvFilter::new("gitprovider=warn"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let ctx = CallContext::new();
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling in-flight requests");
            interrupt.cancel();
        }
    });

    match cli::run(cli, &ctx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
