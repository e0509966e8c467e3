// This is where we create the default webserver for running the binary
// locally

use anyhow::Result;
use archivist::application::{application::Application, config::configuration::Configuration};
use clap::Parser;
use std::net::SocketAddr;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let configuration = Configuration::parse();

    // We get the logging setup first
    Application::install_logging(&configuration);
    info!("archivist starting up");

    // Create a oneshot channel
    let (tx, rx) = oneshot::channel();

    // Spawn a task to listen for signals
    tokio::spawn(async move {
        signal::ctrl_c().await.expect("failed to listen for event");
        let _ = tx.send(());
    });

    let application = Application::initialize(configuration).await?;
    debug!("initialized application");

    tokio::select! {
        result = run(application) => {
            if let Err(err) = result {
                error!(?err, "webserver failed");
                return Err(err);
            }
        }
        _ = rx => {
            debug!("signal received, shutting down");
        }
    }

    Ok(())
}

pub async fn run(application: Application) -> Result<()> {
    let bind = SocketAddr::new(
        application.config.host.parse()?,
        application.config.port,
    );
    let router = archivist::webserver::router(application);

    axum::Server::bind(&bind)
        .serve(router.into_make_service())
        .await?;

    Ok(())
}
