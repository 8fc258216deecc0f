//! Connection registry for the match server
//!
//! This module tracks every connected client on behalf of the dispatcher:
//! - Connection lifecycle (connect, login, disconnect)
//! - The identity a connection has logged in as
//! - Per-connection protocol mode (human text or JSON)
//! - Bounded outbound delivery and detection of stalled peers
//!
//! Only the dispatcher task mutates the registry. Connection tasks never
//! touch it; they hold the receiving end of the outbound queue.

use crate::collaborators::Identity;
use log::{info, warn};
use shared::Event;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Represents a connected client
///
/// Each client maintains:
/// - Connection metadata (ID, address)
/// - The identity established at login
/// - The match it currently plays in or watches
/// - A sender feeding its connection's write task
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned when the connection was accepted
    pub id: u32,
    /// Remote address, for logging
    pub addr: SocketAddr,
    /// Display name, empty until login
    pub name: String,
    /// Account number of a registered user
    pub account: Option<u64>,
    /// Whether the login was verified against an account
    pub authenticated: bool,
    /// Whether any login (including guest) has completed
    pub logged_in: bool,
    /// Encode outbound events as JSON instead of text
    pub json: bool,
    /// Match this client is seated in or spectating
    pub game: Option<u32>,
    sender: mpsc::Sender<String>,
    overflowed: bool,
}

impl Client {
    /// Creates a new, not yet logged-in client
    pub fn new(id: u32, addr: SocketAddr, sender: mpsc::Sender<String>) -> Self {
        Self {
            id,
            addr,
            name: String::new(),
            account: None,
            authenticated: false,
            logged_in: false,
            json: false,
            game: None,
            sender,
            overflowed: false,
        }
    }

    /// Applies a completed login
    pub fn log_in(&mut self, identity: Identity) {
        self.name = identity.name;
        self.account = identity.account;
        self.authenticated = identity.authenticated;
        self.logged_in = true;
    }

    /// Queues an event for delivery
    ///
    /// Never waits. When the connection's buffer is full the peer has
    /// stopped reading; the client is flagged and the dispatcher drops it
    /// after the current command. A closed queue means the connection is
    /// already going away and the event is discarded.
    pub fn send(&mut self, event: &Event) {
        if self.overflowed {
            return;
        }
        let line = match event.encode(self.json) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to encode event for client {}: {}", self.id, e);
                return;
            }
        };
        match self.sender.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Outbound buffer of client {} is full", self.id);
                self.overflowed = true;
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Whether the outbound buffer overflowed
    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }
}

/// Manages all connected clients
///
/// The ClientManager owns every live connection handle, enforces the
/// connection limit and answers the lookups the dispatcher needs: by id for
/// routing events and by display name for rejoining and name uniqueness.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
        }
    }

    /// Registers a new connection
    ///
    /// Returns false if the server is at capacity or the id is already in
    /// use; the connection is then refused.
    pub fn add_client(&mut self, client: Client) -> bool {
        if self.clients.len() >= self.max_clients || self.clients.contains_key(&client.id) {
            return false;
        }

        info!("Client {} connected from {}", client.id, client.addr);
        self.clients.insert(client.id, client);
        true
    }

    /// Removes a client, returning it if it was registered
    ///
    /// Dropping the returned client drops its outbound sender, which lets
    /// the connection's write task drain and finish.
    pub fn remove_client(&mut self, client_id: &u32) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        if client.name.is_empty() {
            info!("Client {} disconnected", client.id);
        } else {
            info!("Client {} ({}) disconnected", client.id, client.name);
        }
        Some(client)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn get_mut(&mut self, client_id: u32) -> Option<&mut Client> {
        self.clients.get_mut(&client_id)
    }

    /// Finds a logged-in client by display name, ignoring case
    pub fn find_by_name(&self, name: &str) -> Option<u32> {
        self.clients
            .values()
            .find(|client| client.logged_in && client.name.eq_ignore_ascii_case(name))
            .map(|client| client.id)
    }

    /// Sends an event to one client, if it is still connected
    pub fn send(&mut self, client_id: u32, event: &Event) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.send(event);
        }
    }

    /// Clients whose outbound buffer overflowed
    pub fn overflowed(&self) -> Vec<u32> {
        self.clients
            .values()
            .filter(|client| client.is_overflowed())
            .map(|client| client.id)
            .collect()
    }

    /// Number of clients that completed login
    pub fn logged_in_count(&self) -> usize {
        self.clients.values().filter(|client| client.logged_in).count()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
