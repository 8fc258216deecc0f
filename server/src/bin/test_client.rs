//! Interactive line client for poking at a running match server.
//! Lines typed on stdin are sent as-is; everything the server sends is
//! printed.

use clap::Parser;
use log::{debug, info};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:1337")]
    server: String,

    /// Log in with this name right after connecting
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Ask the server for JSON events
    #[arg(short = 'j', long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Connecting to: {}", args.server);
    let stream = TcpStream::connect(&args.server).await?;
    let (reader, mut writer) = stream.into_split();
    println!("Connected to {}, type help for commands", args.server);

    if args.name.is_some() || args.json {
        let keyword = if args.json { "loginjson" } else { "login" };
        let login = match &args.name {
            Some(name) => format!("{} {}\n", keyword, name),
            None => format!("{}\n", keyword),
        };
        writer.write_all(login.as_bytes()).await?;
    }

    let mut server_lines = BufReader::new(reader).lines();
    let mut input_lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = server_lines.next_line() => {
                match line? {
                    Some(line) => println!("{}", line),
                    None => {
                        println!("Server closed the connection");
                        break;
                    }
                }
            }
            line = input_lines.next_line() => {
                match line? {
                    Some(line) => {
                        debug!("Sending: {}", line);
                        writer.write_all(line.as_bytes()).await?;
                        writer.write_all(b"\n").await?;
                    }
                    None => break,
                }
            }
        }
    }

    writer.shutdown().await?;
    println!("Test client finished");
    Ok(())
}
