//! Rules engine shared by the server and its clients.
//!
//! The crate is pure and synchronous: board geometry, move legality, the
//! per-match state machine and the wire protocol. The server drives it from a
//! single task; nothing here locks or performs I/O.

pub mod board;
pub mod dice;
pub mod error;
pub mod game;
pub mod legality;
pub mod moves;
pub mod protocol;

pub use board::{Board, Variant};
pub use dice::{DieSource, LoadedDice, RandomDice};
pub use error::{GameError, ParseError};
pub use game::{Game, GameResult, GameView, Phase};
pub use moves::Move;
pub use protocol::{Command, Event, GameListing};
