//! Match coordinator
//!
//! Binds one [`Game`] to the connections playing and watching it. Seats are
//! remembered by display name, so a player who drops out keeps their seat and
//! is put back into it when they return under the same name. Every outbound
//! board, move and roll is projected into each recipient's own frame.

use crate::client_manager::ClientManager;
use log::info;
use shared::board::opponent;
use shared::game::{Game, Phase};
use shared::{Event, GameListing, Move, Variant};

/// Where a client ended up after joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    Player(u8),
    Spectator,
}

#[derive(Debug)]
pub struct ServerMatch {
    pub id: u32,
    pub name: String,
    pub password: Option<String>,
    pub game: Game,
    /// Client currently occupying each seat.
    pub seats: [Option<u32>; 2],
    /// Account behind each seat, once claimed.
    pub accounts: [Option<u64>; 2],
    pub spectators: Vec<u32>,
    pub created: u64,
}

impl ServerMatch {
    pub fn new(
        id: u32,
        name: String,
        password: Option<String>,
        variant: Variant,
        points: u32,
        now: u64,
    ) -> Self {
        Self {
            id,
            name,
            password,
            game: Game::new(variant, points),
            seats: [None, None],
            accounts: [None, None],
            spectators: Vec::new(),
            created: now,
        }
    }

    /// Seat number of a client, if it is playing here.
    pub fn seat_of(&self, client_id: u32) -> Option<u8> {
        self.seats
            .iter()
            .position(|seat| *seat == Some(client_id))
            .map(|index| index as u8 + 1)
    }

    pub fn is_spectator(&self, client_id: u32) -> bool {
        self.spectators.contains(&client_id)
    }

    /// Seat reserved for `name` as one of the two original participants.
    pub fn seat_for_name(&self, name: &str) -> Option<u8> {
        [1u8, 2]
            .into_iter()
            .find(|number| {
                let player = self.game.player(*number);
                !player.name.is_empty() && player.name.eq_ignore_ascii_case(name)
            })
    }

    /// Whether `name` may take its seat back.
    pub fn can_rejoin(&self, name: &str) -> bool {
        !self.game.is_over()
            && self
                .seat_for_name(name)
                .map(|number| self.seats[number as usize - 1].is_none())
                .unwrap_or(false)
    }

    fn open_seats(&self) -> Vec<u8> {
        [1u8, 2]
            .into_iter()
            .filter(|number| self.game.player(*number).name.is_empty())
            .collect()
    }

    pub fn player_count(&self) -> u8 {
        self.seats.iter().filter(|seat| seat.is_some()).count() as u8
    }

    /// No players and no spectators remain.
    pub fn is_abandoned(&self) -> bool {
        self.player_count() == 0 && self.spectators.is_empty()
    }

    pub fn listing(&self) -> GameListing {
        GameListing {
            id: self.id,
            password: self.password.is_some(),
            points: self.game.points,
            players: self.player_count(),
            variant: self.game.variant,
            name: self.name.clone(),
        }
    }

    /// Attaches a client as a player or a spectator.
    ///
    /// A returning participant gets their old seat. A newcomer takes a seat
    /// nobody has claimed yet, chosen by `pick` when both are free, and brings
    /// its `rating` along. Everyone else watches.
    pub fn add_client(
        &mut self,
        clients: &mut ClientManager,
        client_id: u32,
        rating: Option<i32>,
        pick: impl FnOnce() -> u8,
        now: u64,
    ) -> Seat {
        let Some(client) = clients.get(client_id) else {
            return Seat::Spectator;
        };
        let name = client.name.clone();
        let account = client.account;

        let seat = if let Some(number) = self.seat_for_name(&name).filter(|_| self.can_rejoin(&name)) {
            Some(number)
        } else if self.seat_for_name(&name).is_none() {
            match self.open_seats().as_slice() {
                [only] => Some(*only),
                [_, _] => Some(if pick() == 2 { 2 } else { 1 }),
                _ => None,
            }
        } else {
            None
        };

        let joined = match seat {
            Some(number) => {
                let index = number as usize - 1;
                self.seats[index] = Some(client_id);
                let player = self.game.player_mut(number);
                if player.name.is_empty() {
                    player.name = name.clone();
                    player.rating = rating;
                    self.accounts[index] = account;
                }
                info!("{} joined match {} as player {}", name, self.id, number);
                Seat::Player(number)
            }
            None => {
                self.spectators.push(client_id);
                info!("{} is spectating match {}", name, self.id);
                Seat::Spectator
            }
        };

        if let Some(client) = clients.get_mut(client_id) {
            client.game = Some(self.id);
        }

        let event = Event::Joined {
            game_id: self.id,
            player_number: match joined {
                Seat::Player(number) => number,
                Seat::Spectator => 0,
            },
            player: name,
        };
        self.send_all(clients, &event);

        if self.player_count() == 2 && self.game.phase == Phase::WaitingForPlayers {
            self.game.start(now);
            info!("Match {} started", self.id);
        }
        self.send_boards(clients);
        joined
    }

    /// Detaches a client. A player's seat stays reserved for rejoining.
    pub fn remove_client(&mut self, clients: &mut ClientManager, client_id: u32) -> bool {
        let player_number = if let Some(number) = self.seat_of(client_id) {
            self.seats[number as usize - 1] = None;
            number
        } else if let Some(index) = self.spectators.iter().position(|id| *id == client_id) {
            self.spectators.remove(index);
            0
        } else {
            return false;
        };

        let name = clients
            .get(client_id)
            .map(|client| client.name.clone())
            .unwrap_or_default();
        let event = Event::Left {
            game_id: self.id,
            player_number,
            player: name,
        };
        clients.send(client_id, &event);
        self.send_all(clients, &event);
        if let Some(client) = clients.get_mut(client_id) {
            client.game = None;
        }
        true
    }

    /// Every connected recipient with the seat it views from.
    fn recipients(&self) -> Vec<(u32, Option<u8>)> {
        let players = [1u8, 2]
            .into_iter()
            .filter_map(|number| self.seats[number as usize - 1].map(|id| (id, Some(number))));
        players
            .chain(self.spectators.iter().map(|id| (*id, None)))
            .collect()
    }

    pub fn send_all(&self, clients: &mut ClientManager, event: &Event) {
        for (client_id, _) in self.recipients() {
            clients.send(client_id, event);
        }
    }

    /// Sends to everyone in the match except `sender`.
    pub fn send_others(&self, clients: &mut ClientManager, sender: u32, event: &Event) {
        for (client_id, _) in self.recipients() {
            if client_id != sender {
                clients.send(client_id, event);
            }
        }
    }

    /// Board view for one recipient. Spectators see player 1's side.
    pub fn board_for(&self, seat: Option<u8>) -> Event {
        let mut view = self.game.view(seat.unwrap_or(1));
        view.game_id = self.id;
        if seat.is_none() {
            view.spectating = true;
            view.player_number = 0;
        }
        Event::Board(view)
    }

    pub fn send_board(&self, clients: &mut ClientManager, client_id: u32) {
        let seat = self.seat_of(client_id);
        clients.send(client_id, &self.board_for(seat));
    }

    pub fn send_boards(&self, clients: &mut ClientManager) {
        for (client_id, seat) in self.recipients() {
            clients.send(client_id, &self.board_for(seat));
        }
    }

    /// Announces moves given in the canonical frame.
    pub fn send_moved(&self, clients: &mut ClientManager, player: &str, moves: &[Move]) {
        for (client_id, seat) in self.recipients() {
            let moves = moves
                .iter()
                .map(|mv| mv.flipped(seat.unwrap_or(1)))
                .collect();
            let event = Event::Moved {
                player: player.to_string(),
                moves,
            };
            clients.send(client_id, &event);
        }
    }

    pub fn send_rolled(&self, clients: &mut ClientManager, player: &str, roll: Vec<u8>) {
        let event = Event::Rolled {
            player: player.to_string(),
            roll,
        };
        self.send_all(clients, &event);
    }

    pub fn player_name(&self, number: u8) -> &str {
        &self.game.player(number).name
    }

    pub fn opponent_name(&self, number: u8) -> &str {
        self.player_name(opponent(number))
    }
}
