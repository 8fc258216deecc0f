use std::time::Duration;

/// Runtime settings of the match server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the TCP listener binds to.
    pub address: String,
    /// Maximum number of concurrent connections.
    pub max_clients: usize,
    /// Capacity of the single command queue feeding the dispatcher.
    pub command_queue: usize,
    /// Lines buffered per connection before the client is dropped as stalled.
    pub outbound_buffer: usize,
    /// Deadline for writing one line to a peer.
    pub write_timeout: Duration,
    /// Time pending output may take to drain after the peer hangs up.
    pub drain_grace: Duration,
    /// Interval of the abandoned-match sweep.
    pub sweep_interval: Duration,
    /// Finished match replays kept for `replay <id>`.
    pub replay_capacity: usize,
    /// Message of the day sent with the welcome event.
    pub motd: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:1337".to_string(),
            max_clients: 1024,
            command_queue: 1000,
            outbound_buffer: 256,
            write_timeout: Duration::from_secs(30),
            drain_grace: Duration::from_secs(2),
            sweep_interval: Duration::from_secs(60),
            replay_capacity: 100,
            motd: None,
        }
    }
}

impl ServerConfig {
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }
}
