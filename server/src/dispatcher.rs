//! Server dispatcher
//!
//! The single worker that applies every command. Connection tasks only
//! enqueue raw lines; clients and matches are changed here and nowhere else,
//! so all state transitions happen in one strict order.

use crate::client_manager::{Client, ClientManager};
use crate::collaborators::{
    AccountError, AccountStore, Identity, MatchResult, RatingOutcome, ResultSink,
};
use crate::config::ServerConfig;
use crate::coordinator::{Seat, ServerMatch};
use crate::match_manager::MatchManager;
use crate::utils::{get_timestamp, guest_name, valid_name};
use log::{debug, error, info, warn};
use rand::Rng;
use shared::game::{GameResult, OkOutcome, Rolled};
use shared::protocol::help_text;
use shared::{Command, DieSource, Event, GameError, ParseError, Variant};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

const MAX_GUEST_ATTEMPTS: usize = 100;
const LOGIN_HINT: &str = "please log in first: login [name] [password]";

/// Commands accepted before login completes.
fn allowed_before_login(command: &Command) -> bool {
    matches!(
        command,
        Command::Login { .. }
            | Command::Register { .. }
            | Command::Help { .. }
            | Command::Ping { .. }
            | Command::Pong
            | Command::Json { .. }
            | Command::Disconnect
    )
}

/// Commands a spectator may use. None of them touch match state.
fn allowed_for_spectator(command: &Command) -> bool {
    matches!(
        command,
        Command::Board
            | Command::Say { .. }
            | Command::Leave
            | Command::List
            | Command::Help { .. }
            | Command::Ping { .. }
            | Command::Pong
            | Command::Json { .. }
            | Command::Replay { .. }
            | Command::Disconnect
    )
}

/// The rejection event for a command.
fn failure(command: &Command, reason: impl Into<String>) -> Event {
    let reason = reason.into();
    match command {
        Command::Login { .. } | Command::Register { .. } => Event::FailedLogin { reason },
        Command::Create { .. } => Event::FailedCreate { reason },
        Command::Join { .. } => Event::FailedJoin { reason },
        Command::Leave => Event::FailedLeave { reason },
        Command::Roll => Event::FailedRoll { reason },
        Command::Move { .. } => Event::FailedMove { reason },
        Command::Ok { .. } => Event::FailedOk { reason },
        _ => Event::notice(reason),
    }
}

/// Separates invariant violations, which stop the server, from rejections.
fn fatal(e: GameError) -> Result<GameError, GameError> {
    match e {
        GameError::Invariant(reason) => {
            error!("Invariant violated: {}", reason);
            Err(GameError::Invariant(reason))
        }
        other => Ok(other),
    }
}

fn rejected(
    clients: &mut ClientManager,
    client_id: u32,
    command: &Command,
    e: GameError,
) -> Result<(), GameError> {
    let e = fatal(e)?;
    clients.send(client_id, &failure(command, e.to_string()));
    Ok(())
}

/// Detaches a client from its match and forgets it.
fn drop_client(clients: &mut ClientManager, matches: &mut MatchManager, client_id: u32) {
    let game = clients.get(client_id).and_then(|client| client.game);
    if let Some(m) = game.and_then(|id| matches.get_mut(id)) {
        m.remove_client(clients, client_id);
    }
    clients.remove_client(&client_id);
}

fn announce_roll(
    clients: &mut ClientManager,
    m: &ServerMatch,
    name: &str,
    rolled: Rolled,
) {
    let cannot_move = |player: &str| Event::notice(format!("{} cannot move", player));
    match rolled {
        Rolled::Opening { die } => m.send_rolled(clients, name, vec![die]),
        Rolled::Tie { die } => {
            m.send_rolled(clients, name, vec![die]);
            m.send_all(
                clients,
                &Event::notice(format!("both players rolled {}, roll again", die)),
            );
        }
        Rolled::Started {
            die,
            starter,
            dice,
            forced_pass,
        } => {
            m.send_rolled(clients, name, vec![die]);
            let starter = m.player_name(starter).to_string();
            m.send_all(clients, &Event::notice(format!("{} goes first", starter)));
            if m.game.variant != Variant::Backgammon {
                m.send_rolled(clients, &starter, dice);
            }
            if forced_pass {
                m.send_all(clients, &cannot_move(&starter));
            }
        }
        Rolled::Turn { dice, forced_pass } => {
            m.send_rolled(clients, name, dice);
            if forced_pass {
                m.send_all(clients, &cannot_move(name));
            }
        }
    }
}

fn pick_seat() -> u8 {
    rand::thread_rng().gen_range(1..=2)
}

/// The requesting connection and the registries it acts on.
struct Request<'a> {
    clients: &'a mut ClientManager,
    matches: &'a mut MatchManager,
    client_id: u32,
}

impl Request<'_> {
    fn reply(&mut self, event: &Event) {
        self.clients.send(self.client_id, event);
    }

    fn name(&self) -> String {
        self.clients
            .get(self.client_id)
            .map(|client| client.name.clone())
            .unwrap_or_default()
    }

    fn game(&self) -> Option<u32> {
        self.clients.get(self.client_id).and_then(|client| client.game)
    }

    /// Another logged-in connection already uses `name`.
    fn name_taken(&self, name: &str) -> bool {
        matches!(self.clients.find_by_name(name), Some(other) if other != self.client_id)
    }
}

pub struct Dispatcher {
    clients: Arc<RwLock<ClientManager>>,
    matches: Arc<RwLock<MatchManager>>,
    accounts: Box<dyn AccountStore>,
    results: Box<dyn ResultSink>,
    dice: Box<dyn DieSource + Send>,
    /// Replays of finished matches, oldest first.
    replays: VecDeque<(u32, Vec<String>)>,
    config: ServerConfig,
}

impl Dispatcher {
    pub fn new(
        config: ServerConfig,
        accounts: Box<dyn AccountStore>,
        results: Box<dyn ResultSink>,
        dice: Box<dyn DieSource + Send>,
    ) -> Self {
        Self {
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            matches: Arc::new(RwLock::new(MatchManager::new())),
            accounts,
            results,
            dice,
            replays: VecDeque::new(),
            config,
        }
    }

    pub fn clients(&self) -> Arc<RwLock<ClientManager>> {
        Arc::clone(&self.clients)
    }

    pub fn matches(&self) -> Arc<RwLock<MatchManager>> {
        Arc::clone(&self.matches)
    }

    /// Registers a new connection. Returns false when it was refused.
    pub async fn connect(
        &mut self,
        client_id: u32,
        addr: SocketAddr,
        sender: mpsc::Sender<String>,
    ) -> bool {
        let clients = Arc::clone(&self.clients);
        let mut clients = clients.write().await;
        let mut client = Client::new(client_id, addr, sender);

        if clients.len() >= self.config.max_clients {
            warn!("Refusing client {} from {}: server full", client_id, addr);
            client.send(&Event::notice("the server is full, try again later"));
            return false;
        }
        client.send(&Event::notice(
            "connected to the match server, log in with: login [name] [password]",
        ));
        clients.add_client(client)
    }

    /// Forgets a connection. A held seat stays reserved for rejoining.
    pub async fn disconnect(&mut self, client_id: u32) {
        let clients = Arc::clone(&self.clients);
        let matches = Arc::clone(&self.matches);
        let mut clients = clients.write().await;
        let mut matches = matches.write().await;
        drop_client(&mut clients, &mut matches, client_id);
    }

    /// Applies one inbound line. Only an invariant violation is returned as
    /// an error; every other problem is answered on the connection.
    pub async fn command(&mut self, client_id: u32, line: &str) -> Result<(), GameError> {
        let clients = Arc::clone(&self.clients);
        let matches = Arc::clone(&self.matches);
        let mut clients = clients.write().await;
        let mut matches = matches.write().await;

        let mut request = Request {
            clients: &mut *clients,
            matches: &mut *matches,
            client_id,
        };
        let result = self.apply(&mut request, line);

        for id in clients.overflowed() {
            warn!("Dropping client {}: outbound buffer overflowed", id);
            drop_client(&mut clients, &mut matches, id);
        }
        result
    }

    /// Removes matches nobody is playing or watching.
    pub async fn sweep(&mut self) -> Vec<u32> {
        let matches = Arc::clone(&self.matches);
        let mut matches = matches.write().await;
        matches.sweep()
    }

    fn apply(&mut self, req: &mut Request, line: &str) -> Result<(), GameError> {
        let Some(client) = req.clients.get(req.client_id) else {
            return Ok(());
        };
        let logged_in = client.logged_in;

        let command = match Command::parse_line(line) {
            Ok(command) => command,
            Err(ParseError::Empty) => return Ok(()),
            Err(e) => {
                req.reply(&Event::notice(format!(
                    "{}, type help for a list of commands",
                    e
                )));
                return Ok(());
            }
        };
        debug!("Client {} sent {}", req.client_id, command.keyword());

        if !logged_in && !allowed_before_login(&command) {
            req.reply(&failure(&command, LOGIN_HINT));
            return Ok(());
        }
        if logged_in && matches!(command, Command::Login { .. } | Command::Register { .. }) {
            req.reply(&failure(&command, "you are already logged in"));
            return Ok(());
        }
        let spectating = req
            .game()
            .and_then(|id| req.matches.get(id))
            .map(|m| m.is_spectator(req.client_id))
            .unwrap_or(false);
        if spectating && !allowed_for_spectator(&command) {
            let reason = format!("spectators cannot use {}", command.keyword());
            req.reply(&failure(&command, reason));
            return Ok(());
        }

        match command {
            Command::Login {
                username,
                password,
                json,
            } => self.login(req, username, password, json),
            Command::Register {
                email,
                username,
                password,
            } => self.register(req, &email, &username, &password),
            Command::Json { enabled } => {
                if let Some(client) = req.clients.get_mut(req.client_id) {
                    client.json = enabled;
                }
                req.reply(&Event::notice(if enabled {
                    "json mode on"
                } else {
                    "json mode off"
                }));
            }
            Command::Help { topic } => {
                let message = help_text(topic.as_deref());
                req.reply(&Event::Help { topic, message });
            }
            Command::List => {
                let games = req.matches.listings();
                req.reply(&Event::List { games });
            }
            Command::Say { message } => self.say(req, message),
            Command::Ping { message } => req.reply(&Event::Ping {
                message: message.unwrap_or_default(),
            }),
            Command::Pong => {}
            Command::Disconnect => {
                info!("Client {} disconnected by request", req.client_id);
                drop_client(req.clients, req.matches, req.client_id);
            }
            Command::Create {
                public,
                password,
                points,
                variant,
                name,
            } => self.create(req, password.filter(|_| !public), points, variant, name),
            Command::Join { target, password } => self.join(req, &target, password),
            Command::Leave => match req.game() {
                Some(match_id) => {
                    if let Some(m) = req.matches.get_mut(match_id) {
                        m.remove_client(req.clients, req.client_id);
                    }
                }
                None => req.reply(&Event::FailedLeave {
                    reason: "you are not in a match".to_string(),
                }),
            },
            Command::Rematch => self.rematch(req),
            Command::Board => match req.game() {
                Some(match_id) => {
                    if let Some(m) = req.matches.get(match_id) {
                        m.send_board(req.clients, req.client_id);
                    }
                }
                None => req.reply(&Event::notice("you are not in a match")),
            },
            Command::Replay { id } => self.replay(req, id),
            command @ (Command::Roll
            | Command::Move { .. }
            | Command::Reset
            | Command::Ok { .. }
            | Command::Double
            | Command::Resign) => return self.play(req, &command),
        }
        Ok(())
    }

    fn login(
        &mut self,
        req: &mut Request,
        username: Option<String>,
        password: Option<String>,
        json: bool,
    ) {
        if json {
            if let Some(client) = req.clients.get_mut(req.client_id) {
                client.json = true;
            }
        }

        let identity = match (username, password) {
            (Some(name), Some(password)) => match self.accounts.authenticate(&name, &password) {
                Ok(identity) => identity,
                Err(e) => {
                    warn!("Failed login for {} from client {}", name, req.client_id);
                    req.reply(&Event::FailedLogin {
                        reason: e.to_string(),
                    });
                    return;
                }
            },
            (Some(name), None) => {
                if !valid_name(&name) {
                    req.reply(&Event::FailedLogin {
                        reason: AccountError::InvalidName(name).to_string(),
                    });
                    return;
                }
                if self.accounts.is_registered(&name) {
                    req.reply(&Event::FailedLogin {
                        reason: format!("{} is a registered name, log in with its password", name),
                    });
                    return;
                }
                Identity::guest(name)
            }
            (None, _) => {
                let mut rng = rand::thread_rng();
                let name = (0..MAX_GUEST_ATTEMPTS)
                    .map(|_| guest_name(&mut rng))
                    .find(|name| req.clients.find_by_name(name).is_none());
                match name {
                    Some(name) => Identity::guest(name),
                    None => {
                        req.reply(&Event::FailedLogin {
                            reason: "no guest name is available, choose a name".to_string(),
                        });
                        return;
                    }
                }
            }
        };
        self.complete_login(req, identity);
    }

    fn register(&mut self, req: &mut Request, email: &str, username: &str, password: &str) {
        if req.name_taken(username) {
            req.reply(&Event::FailedLogin {
                reason: AccountError::NameTaken(username.to_string()).to_string(),
            });
            return;
        }
        match self.accounts.register(email, username, password) {
            Ok(identity) => self.complete_login(req, identity),
            Err(e) => req.reply(&Event::FailedLogin {
                reason: e.to_string(),
            }),
        }
    }

    fn complete_login(&mut self, req: &mut Request, identity: Identity) {
        if req.name_taken(&identity.name) {
            req.reply(&Event::FailedLogin {
                reason: format!("{} is already logged in", identity.name),
            });
            return;
        }

        let name = identity.name.clone();
        let authenticated = identity.authenticated;
        match req.clients.get_mut(req.client_id) {
            Some(client) => client.log_in(identity),
            None => return,
        }
        info!(
            "Client {} logged in as {}{}",
            req.client_id,
            name,
            if authenticated { "" } else { " (guest)" }
        );

        let welcome = Event::Welcome {
            player_name: name.clone(),
            clients: req.clients.logged_in_count(),
            games: req.matches.len(),
            motd: self.config.motd.clone(),
        };
        req.reply(&welcome);

        if let Some(match_id) = req.matches.find_rejoin(&name) {
            info!("{} is rejoining match {}", name, match_id);
            self.seat(req, match_id);
        }
    }

    /// Puts the requesting client into a match.
    fn seat(&mut self, req: &mut Request, match_id: u32) -> Option<Seat> {
        let account = req.clients.get(req.client_id)?.account;
        let m = req.matches.get_mut(match_id)?;
        let rating = account.and_then(|account| self.accounts.rating(account, m.game.variant));
        Some(m.add_client(req.clients, req.client_id, rating, pick_seat, get_timestamp()))
    }

    fn say(&mut self, req: &mut Request, message: String) {
        let player = req.name();
        match req.game().and_then(|id| req.matches.get(id)) {
            Some(m) => m.send_others(req.clients, req.client_id, &Event::Say { player, message }),
            None => req.reply(&Event::notice("you are not in a match")),
        }
    }

    fn create(
        &mut self,
        req: &mut Request,
        password: Option<String>,
        points: u32,
        variant: Variant,
        name: Option<String>,
    ) {
        if req.game().is_some() {
            req.reply(&Event::FailedCreate {
                reason: "leave your current match first".to_string(),
            });
            return;
        }
        let name = name.unwrap_or_else(|| format!("{}'s match", req.name()));
        let match_id = req
            .matches
            .create(name, password, variant, points, get_timestamp());
        self.seat(req, match_id);
    }

    fn join(&mut self, req: &mut Request, target: &str, password: Option<String>) {
        if req.game().is_some() {
            req.reply(&Event::FailedJoin {
                reason: "leave your current match first".to_string(),
            });
            return;
        }

        let match_id = match target.parse::<u32>() {
            Ok(id) => Some(id).filter(|id| req.matches.get(*id).is_some()),
            Err(_) => req.matches.find_by_player_name(target),
        };
        let Some(m) = match_id.and_then(|id| req.matches.get(id)) else {
            req.reply(&Event::FailedJoin {
                reason: format!("no match found for {}", target),
            });
            return;
        };

        if let Some(expected) = &m.password {
            let name = req.name();
            if password.as_deref() != Some(expected.as_str()) && !m.can_rejoin(&name) {
                req.reply(&Event::FailedJoin {
                    reason: "invalid password".to_string(),
                });
                return;
            }
        }
        let match_id = m.id;
        self.seat(req, match_id);
    }

    fn rematch(&mut self, req: &mut Request) {
        let Some(old) = req.game().and_then(|id| req.matches.get(id)) else {
            req.reply(&Event::notice("you are not in a match"));
            return;
        };
        if !old.game.is_over() {
            req.reply(&Event::notice("the match is not over yet"));
            return;
        }
        if old.player_count() < 2 {
            req.reply(&Event::notice("your opponent has left the match"));
            return;
        }

        let old_id = old.id;
        let game = old.game.rematch();
        let (name, password, accounts) = (old.name.clone(), old.password.clone(), old.accounts);
        let members: Vec<u32> = old
            .seats
            .iter()
            .flatten()
            .copied()
            .chain(old.spectators.iter().copied())
            .collect();

        let now = get_timestamp();
        let new_id = req
            .matches
            .create(name, password, game.variant, game.points, now);
        info!("Match {} is a rematch of match {}", new_id, old_id);
        if let Some(new) = req.matches.get_mut(new_id) {
            new.game = game;
            new.accounts = accounts;
        }
        for member in &members {
            if let Some(old) = req.matches.get_mut(old_id) {
                old.remove_client(req.clients, *member);
            }
        }
        for member in members {
            if let Some(new) = req.matches.get_mut(new_id) {
                new.add_client(req.clients, member, None, pick_seat, now);
            }
        }
    }

    fn replay(&mut self, req: &mut Request, id: Option<u32>) {
        let Some(id) = id.or_else(|| req.game()) else {
            req.reply(&Event::notice("you are not in a match, use replay <id>"));
            return;
        };
        let lines = req
            .matches
            .get(id)
            .map(|m| m.game.replay_log())
            .or_else(|| {
                self.replays
                    .iter()
                    .rev()
                    .find(|(game_id, _)| *game_id == id)
                    .map(|(_, lines)| lines.clone())
            });
        match lines {
            Some(lines) => req.reply(&Event::Replay { game_id: id, lines }),
            None => req.reply(&Event::notice(format!("no replay found for match {}", id))),
        }
    }

    /// Turn actions of a seated player.
    fn play(&mut self, req: &mut Request, command: &Command) -> Result<(), GameError> {
        let client_id = req.client_id;
        let name = req.name();
        let Some(m) = req.game().and_then(|id| req.matches.get_mut(id)) else {
            req.reply(&failure(command, "you are not in a match"));
            return Ok(());
        };
        let clients = &mut *req.clients;
        let Some(seat) = m.seat_of(client_id) else {
            clients.send(client_id, &failure(command, "only players can do that"));
            return Ok(());
        };

        match command {
            Command::Roll => {
                let rolled = match m.game.roll(seat, &mut *self.dice) {
                    Ok(rolled) => rolled,
                    Err(e) => return rejected(clients, client_id, command, e),
                };
                announce_roll(clients, m, &name, rolled);
            }
            Command::Move { moves } => {
                let outcome = match m.game.add_moves(seat, moves) {
                    Ok(outcome) => outcome,
                    Err(e) => return rejected(clients, client_id, command, e),
                };
                m.send_moved(clients, &name, &outcome.moves);
                if let Some(result) = outcome.result {
                    self.finish_game(clients, m, result);
                }
            }
            Command::Reset => {
                let undone = match m.game.reset(seat) {
                    Ok(undone) => undone,
                    Err(e) => return rejected(clients, client_id, command, e),
                };
                m.send_moved(clients, &name, &undone);
            }
            Command::Ok { doubles } => match m.game.ok(seat, *doubles) {
                Ok(OkOutcome::DoubleAccepted { value }) => m.send_all(
                    clients,
                    &Event::notice(format!(
                        "{} accepts the double, the cube is now at {}",
                        name, value
                    )),
                ),
                Ok(OkOutcome::Doubles { value }) => m.send_rolled(clients, &name, vec![value, value]),
                Ok(OkOutcome::TurnEnded { .. }) => {}
                Err(e) => return rejected(clients, client_id, command, e),
            },
            Command::Double => {
                if let Err(e) = m.game.offer_double(seat) {
                    return rejected(clients, client_id, command, e);
                }
                let offer = format!(
                    "{} offers a double to {}, accept with ok or decline with resign",
                    name,
                    m.game.double_value * 2
                );
                m.send_all(clients, &Event::notice(offer));
            }
            Command::Resign => {
                let result = match m.game.resign(seat) {
                    Ok(result) => result,
                    Err(e) => return rejected(clients, client_id, command, e),
                };
                self.finish_game(clients, m, result);
            }
            _ => return Ok(()),
        }

        m.send_boards(clients);
        Ok(())
    }

    fn finish_game(&mut self, clients: &mut ClientManager, m: &mut ServerMatch, result: GameResult) {
        let winner = m.player_name(result.winner).to_string();
        info!(
            "{} won {} point(s) in match {} ({:?})",
            winner, result.points, m.id, result.kind
        );
        m.send_all(
            clients,
            &Event::Win {
                player: winner,
                points: result.points,
                kind: result.kind,
                resigned: result.resigned,
                match_over: result.match_over,
            },
        );
        if !result.match_over {
            return;
        }

        m.game.ended = get_timestamp();
        let record = MatchResult {
            game_id: m.id,
            variant: m.game.variant,
            player1: m.game.player1.name.clone(),
            player2: m.game.player2.name.clone(),
            account1: m.accounts[0],
            account2: m.accounts[1],
            points: m.game.points,
            score1: m.game.player1.points,
            score2: m.game.player2.points,
            winner: result.winner,
            started: m.game.started,
            ended: m.game.ended,
            replay: m.game.replay_log(),
        };
        self.results.record_match(&record);
        if let Some(outcome) = RatingOutcome::from_result(&record) {
            self.results.record_rating(&outcome);
        }
        self.store_replay(record.game_id, record.replay);
    }

    fn store_replay(&mut self, game_id: u32, lines: Vec<String>) {
        if self.config.replay_capacity == 0 {
            return;
        }
        while self.replays.len() >= self.config.replay_capacity {
            self.replays.pop_front();
        }
        self.replays.push_back((game_id, lines));
    }
}
