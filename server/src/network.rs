//! Server network layer handling TCP connections and the dispatch loop

use crate::client_manager::ClientManager;
use crate::collaborators::{AccountStore, LogResultSink, MemoryAccounts, ResultSink};
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::match_manager::MatchManager;
use log::{debug, error, info, warn};
use shared::{DieSource, GameListing, RandomDice};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, timeout, MissedTickBehavior};

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Messages sent from connection tasks to the dispatch loop
#[derive(Debug)]
pub enum ServerMessage {
    Connected {
        client_id: u32,
        addr: SocketAddr,
        sender: mpsc::Sender<String>,
    },
    Command {
        client_id: u32,
        line: String,
    },
    Disconnected {
        client_id: u32,
    },
    Shutdown,
}

/// Forwards every non-empty inbound line to the dispatch loop
pub async fn read_loop<R: AsyncRead + Unpin>(
    reader: R,
    client_id: u32,
    queue: mpsc::Sender<ServerMessage>,
) -> Result<(), BoxError> {
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if queue
            .send(ServerMessage::Command { client_id, line })
            .await
            .is_err()
        {
            return Err("dispatch loop has stopped".into());
        }
    }
    Ok(())
}

/// Writes queued lines to the peer until the queue closes
///
/// Each line must be written within `write_timeout`; a peer that stops
/// reading ends the connection instead of stalling its writer forever.
pub async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound: mpsc::Receiver<String>,
    write_timeout: Duration,
) -> Result<(), BoxError> {
    while let Some(message) = outbound.recv().await {
        let mut data = message.into_bytes();
        data.push(b'\n');

        let write = async {
            writer.write_all(&data).await?;
            writer.flush().await
        };
        match timeout(write_timeout, write).await {
            Ok(result) => result?,
            Err(_) => return Err("write timed out".into()),
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Failed to shut down writer: {}", e);
    }
    Ok(())
}

/// Runs the read and write halves of one connection
///
/// When the peer hangs up, the dispatcher is told at once and pending output
/// gets `drain_grace` to go out. When writing fails, reading stops too.
pub async fn handle_connection<R, W>(
    reader: R,
    writer: W,
    client_id: u32,
    outbound: mpsc::Receiver<String>,
    queue: mpsc::Sender<ServerMessage>,
    write_timeout: Duration,
    drain_grace: Duration,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut write_task = tokio::spawn(write_loop(writer, outbound, write_timeout));
    let mut read_task = tokio::spawn(read_loop(reader, client_id, queue.clone()));

    tokio::select! {
        result = &mut read_task => {
            if let Ok(Err(e)) = result {
                debug!("Client {} read error: {}", client_id, e);
            }
            if let Err(e) = queue.send(ServerMessage::Disconnected { client_id }).await {
                error!("Failed to report disconnect of client {}: {}", client_id, e);
            }
            if timeout(drain_grace, &mut write_task).await.is_err() {
                debug!("Client {} did not drain in time", client_id);
                write_task.abort();
            }
        }
        result = &mut write_task => {
            read_task.abort();
            if let Ok(Err(e)) = result {
                warn!("Client {} write error: {}", client_id, e);
            }
            if let Err(e) = queue.send(ServerMessage::Disconnected { client_id }).await {
                error!("Failed to report disconnect of client {}: {}", client_id, e);
            }
        }
    }
}

/// Accepts connections and spawns a task pair for each one
async fn accept_loop(listener: TcpListener, config: ServerConfig, queue: mpsc::Sender<ServerMessage>) {
    let mut next_client_id: u32 = 1;

    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Error accepting connection: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };

        let client_id = next_client_id;
        next_client_id = next_client_id.checked_add(1).unwrap_or(1);
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let (sender, outbound) = mpsc::channel(config.outbound_buffer);
        let connected = ServerMessage::Connected {
            client_id,
            addr,
            sender,
        };
        if queue.send(connected).await.is_err() {
            break;
        }

        let (reader, writer) = stream.into_split();
        let queue = queue.clone();
        let (write_timeout, drain_grace) = (config.write_timeout, config.drain_grace);
        tokio::spawn(async move {
            handle_connection(
                reader,
                writer,
                client_id,
                outbound,
                queue,
                write_timeout,
                drain_grace,
            )
            .await;
            debug!("Connection {} from {} closed", client_id, addr);
        });
    }
}

/// Read access to a running server for administrative callers
#[derive(Clone)]
pub struct ServerHandle {
    server_tx: mpsc::Sender<ServerMessage>,
    clients: Arc<RwLock<ClientManager>>,
    matches: Arc<RwLock<MatchManager>>,
}

impl ServerHandle {
    pub async fn shutdown(&self) {
        if let Err(e) = self.server_tx.send(ServerMessage::Shutdown).await {
            warn!("Server already stopped: {}", e);
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn listings(&self) -> Vec<GameListing> {
        self.matches.read().await.listings()
    }
}

/// Main server owning the listener and the single dispatch worker
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    dispatcher: Dispatcher,
    server_tx: mpsc::Sender<ServerMessage>,
    server_rx: mpsc::Receiver<ServerMessage>,
}

impl Server {
    pub async fn bind(
        config: ServerConfig,
        accounts: Box<dyn AccountStore>,
        results: Box<dyn ResultSink>,
        dice: Box<dyn DieSource + Send>,
    ) -> Result<Self, BoxError> {
        let listener = TcpListener::bind(&config.address).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::channel(config.command_queue);
        let dispatcher = Dispatcher::new(config.clone(), accounts, results, dice);

        Ok(Server {
            listener,
            config,
            dispatcher,
            server_tx,
            server_rx,
        })
    }

    /// Binds with in-memory accounts, logged results and fair dice.
    pub async fn new(config: ServerConfig) -> Result<Self, BoxError> {
        Self::bind(
            config,
            Box::new(MemoryAccounts::new()),
            Box::new(LogResultSink),
            Box::new(RandomDice::from_entropy()),
        )
        .await
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server_tx: self.server_tx.clone(),
            clients: self.dispatcher.clients(),
            matches: self.dispatcher.matches(),
        }
    }

    /// Main server loop
    ///
    /// Returns when shut down, or with an error when the dispatcher detects
    /// an invariant violation.
    pub async fn run(self) -> Result<(), BoxError> {
        let Server {
            listener,
            config,
            mut dispatcher,
            server_tx,
            mut server_rx,
        } = self;

        let acceptor = tokio::spawn(accept_loop(listener, config.clone(), server_tx));
        info!("Server started successfully");

        let result = dispatch_loop(&mut dispatcher, &mut server_rx, config.sweep_interval).await;
        acceptor.abort();
        result
    }
}

async fn dispatch_loop(
    dispatcher: &mut Dispatcher,
    server_rx: &mut mpsc::Receiver<ServerMessage>,
    sweep_interval: Duration,
) -> Result<(), BoxError> {
    let mut sweep = interval(sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    sweep.tick().await;

    loop {
        tokio::select! {
            message = server_rx.recv() => {
                match message {
                    Some(ServerMessage::Connected { client_id, addr, sender }) => {
                        dispatcher.connect(client_id, addr, sender).await;
                    }
                    Some(ServerMessage::Command { client_id, line }) => {
                        if let Err(e) = dispatcher.command(client_id, &line).await {
                            error!("Halting after command from client {}: {}", client_id, e);
                            return Err(e.into());
                        }
                    }
                    Some(ServerMessage::Disconnected { client_id }) => {
                        dispatcher.disconnect(client_id).await;
                    }
                    Some(ServerMessage::Shutdown) | None => {
                        info!("Server shutting down");
                        return Ok(());
                    }
                }
            }

            _ = sweep.tick() => {
                let removed = dispatcher.sweep().await;
                if !removed.is_empty() {
                    debug!("Swept {} abandoned matches", removed.len());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    fn expect_command(message: Option<ServerMessage>, expected: &str) {
        match message {
            Some(ServerMessage::Command { client_id, line }) => {
                assert_eq!(client_id, 7);
                assert_eq!(line, expected);
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_loop_forwards_lines() {
        let reader = tokio_test::io::Builder::new()
            .read(b"login alice\r\n\n  \nroll\n")
            .build();
        let (tx, mut rx) = mpsc::channel(8);

        read_loop(reader, 7, tx).await.unwrap();
        expect_command(rx.recv().await, "login alice");
        expect_command(rx.recv().await, "roll");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_read_loop_rejects_invalid_utf8() {
        let reader = tokio_test::io::Builder::new()
            .read(&[0xff, 0xfe, b'\n'])
            .build();
        let (tx, _rx) = mpsc::channel(8);
        assert!(read_loop(reader, 7, tx).await.is_err());
    }

    #[tokio::test]
    async fn test_write_loop_terminates_lines() {
        let writer = tokio_test::io::Builder::new()
            .write(b"notice hi\n")
            .write(b"{\"Type\":\"pong\"}\n")
            .build();
        let (tx, rx) = mpsc::channel(8);
        tx.send("notice hi".to_string()).await.unwrap();
        tx.send("{\"Type\":\"pong\"}".to_string()).await.unwrap();
        drop(tx);

        write_loop(writer, rx, Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_loop_times_out_on_stalled_peer() {
        let (writer, _peer) = tokio::io::duplex(16);
        let (tx, rx) = mpsc::channel(8);
        tx.send("x".repeat(64)).await.unwrap();

        let result = write_loop(writer, rx, Duration::from_millis(50)).await;
        assert_eq!(result.unwrap_err().to_string(), "write timed out");
    }

    #[tokio::test]
    async fn test_connection_reports_disconnect() {
        let reader = tokio_test::io::Builder::new().read(b"ping\n").build();
        let (writer, _peer) = tokio::io::duplex(64);
        let (_outbound_tx, outbound) = mpsc::channel(8);
        let (tx, mut rx) = mpsc::channel(8);

        handle_connection(
            reader,
            writer,
            7,
            outbound,
            tx,
            Duration::from_secs(1),
            Duration::from_millis(20),
        )
        .await;

        expect_command(rx.recv().await, "ping");
        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::Disconnected { client_id: 7 })
        ));
    }

    #[tokio::test]
    async fn test_pending_output_drains_after_hangup() {
        let reader = tokio_test::io::Builder::new().build();
        let (writer, mut peer) = tokio::io::duplex(64);
        let (outbound_tx, outbound) = mpsc::channel(8);
        let (tx, _rx) = mpsc::channel(8);
        outbound_tx.send("notice bye".to_string()).await.unwrap();
        drop(outbound_tx);

        handle_connection(
            reader,
            writer,
            7,
            outbound,
            tx,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await;

        let mut received = String::new();
        peer.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "notice bye\n");
    }

    #[tokio::test]
    async fn test_server_login_over_tcp() {
        let server = Server::new(ServerConfig::with_address("127.0.0.1:0"))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        let running = tokio::spawn(server.run());

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        let greeting = lines.next_line().await.unwrap().unwrap();
        assert!(greeting.starts_with("notice connected"));

        writer.write_all(b"login alice\n").await.unwrap();
        let welcome = lines.next_line().await.unwrap().unwrap();
        assert!(welcome.starts_with("welcome alice"));
        assert_eq!(handle.client_count().await, 1);
        assert!(handle.listings().await.is_empty());

        handle.shutdown().await;
        assert!(running.await.unwrap().is_ok());
    }
}
