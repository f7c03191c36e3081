use clap::Parser;
use log::{error, info};
use server::config::{Args, ServerConfig};
use server::network::Server;
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
    let config = ServerConfig::from_args(&args)?;
    info!(
        "Starting kitchen server on {} ({} Hz, max {} clients)",
        config.bind_addr, args.tick_rate, config.max_clients
    );

    let mut server = match Server::new(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {}", e);
            let e: Box<dyn Error> = e;
            return Err(e);
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                let e: Box<dyn Error> = e;
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
