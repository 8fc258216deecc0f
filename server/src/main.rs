use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;

/// Main-method of the match server.
/// Parses command-line arguments, then runs the server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "1337")]
        port: u16,
        /// Capacity of the shared command queue
        #[clap(long, default_value = "1000")]
        command_queue: usize,
        /// Lines buffered per connection before it is dropped
        #[clap(long, default_value = "256")]
        outbound_buffer: usize,
        /// Seconds allowed for writing one line to a client
        #[clap(long, default_value = "30")]
        write_timeout: u64,
        /// Milliseconds pending output may take to drain after a hangup
        #[clap(long, default_value = "2000")]
        drain_grace: u64,
        /// Seconds between sweeps for abandoned matches
        #[clap(long, default_value = "60")]
        sweep_interval: u64,
        /// Message of the day sent after login
        #[clap(long)]
        motd: Option<String>,
    }

    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        address: format!("{}:{}", args.host, args.port),
        command_queue: args.command_queue.max(1),
        outbound_buffer: args.outbound_buffer.max(1),
        write_timeout: Duration::from_secs(args.write_timeout),
        drain_grace: Duration::from_millis(args.drain_grace),
        sweep_interval: Duration::from_secs(args.sweep_interval.max(1)),
        motd: args.motd,
        ..ServerConfig::default()
    };

    let server = Server::new(config).await?;

    // Handle shutdown gracefully
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
