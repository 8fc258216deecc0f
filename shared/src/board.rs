//! Board representation and perspective geometry
//!
//! The board is stored in a single canonical frame, the frame of player 1:
//! player 1 owns positive slot values and moves from 24 down towards 1,
//! player 2 owns negative slot values and moves from 1 up towards 24.
//! Slot 0 is player 1's home (borne-off checkers), slot 25 is player 2's
//! home, slot 26 is player 1's bar and slot 27 is player 2's bar.
//!
//! Clients never see this frame directly unless they are player 1 or a
//! spectator. Everything sent to player 2 goes through [`flip_space`] so that
//! every viewer reads the board as "my home is 0, my bar is 26".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Total number of slots on a board.
pub const BOARD_SPACES: usize = 28;
/// Home (borne-off checkers) of the player whose frame the board is in.
pub const SPACE_HOME_PLAYER: i8 = 0;
/// Home of the opponent.
pub const SPACE_HOME_OPPONENT: i8 = 25;
/// Bar of the player whose frame the board is in.
pub const SPACE_BAR_PLAYER: i8 = 26;
/// Bar of the opponent.
pub const SPACE_BAR_OPPONENT: i8 = 27;
/// Checkers owned by each player in every supported variant.
pub const CHECKERS_PER_PLAYER: i8 = 15;

/// Supported rule sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Variant {
    #[default]
    Backgammon,
    AceyDeucey,
    Tabula,
}

impl Variant {
    /// Numeric flag used in replay headers and listings.
    pub fn flag(self) -> u8 {
        match self {
            Variant::Backgammon => 0,
            Variant::AceyDeucey => 1,
            Variant::Tabula => 2,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "backgammon" | "bg" => Some(Variant::Backgammon),
            "acey" | "aceydeucey" | "acey-deucey" | "ad" => Some(Variant::AceyDeucey),
            "tabula" | "tab" => Some(Variant::Tabula),
            _ => None,
        }
    }

    /// Dice thrown for a regular turn.
    pub fn dice_count(self) -> usize {
        match self {
            Variant::Tabula => 3,
            _ => 2,
        }
    }

    /// Whether a pair of equal dice is played four times.
    pub fn doubles_played_twice(self) -> bool {
        self != Variant::Tabula
    }

    pub fn has_doubling_cube(self) -> bool {
        self != Variant::Tabula
    }

    /// Whether checkers start off the board and have to be entered first.
    pub fn enters_from_home(self) -> bool {
        self == Variant::AceyDeucey
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Variant::Backgammon => "backgammon",
            Variant::AceyDeucey => "acey-deucey",
            Variant::Tabula => "tabula",
        };
        f.write_str(name)
    }
}

/// Returns the other player number.
pub fn opponent(player: u8) -> u8 {
    if player == 1 {
        2
    } else {
        1
    }
}

/// Home (borne-off) slot of a player in the canonical frame.
pub fn home_space(player: u8) -> i8 {
    if player == 1 {
        SPACE_HOME_PLAYER
    } else {
        SPACE_HOME_OPPONENT
    }
}

/// Bar slot of a player in the canonical frame.
pub fn bar_space(player: u8) -> i8 {
    if player == 1 {
        SPACE_BAR_PLAYER
    } else {
        SPACE_BAR_OPPONENT
    }
}

/// The six points a player bears off from, in the canonical frame.
pub fn home_range(player: u8) -> RangeInclusive<i8> {
    if player == 1 {
        1..=6
    } else {
        19..=24
    }
}

/// Maps a space between player `player`'s own frame and the canonical frame.
///
/// Player 1's frame is the canonical frame, so this is the identity for
/// player 1. For player 2 points are mirrored (`s -> 25 - s`), homes swap and
/// bars swap. Applying it twice always returns the original space.
pub fn flip_space(space: i8, player: u8) -> i8 {
    if player != 2 {
        return space;
    }
    match space {
        SPACE_HOME_PLAYER => SPACE_HOME_OPPONENT,
        SPACE_HOME_OPPONENT => SPACE_HOME_PLAYER,
        SPACE_BAR_PLAYER => SPACE_BAR_OPPONENT,
        SPACE_BAR_OPPONENT => SPACE_BAR_PLAYER,
        point => 25 - point,
    }
}

/// Pip position of a space along `player`'s path, counted down to 0 at home.
///
/// Bar and (for entering variants) the starting home both sit one pip beyond
/// the farthest point.
fn pip_position(player: u8, space: i8, origin: bool) -> i8 {
    let canonical = if player == 1 { space } else { flip_space(space, 2) };
    match canonical {
        SPACE_BAR_PLAYER | SPACE_BAR_OPPONENT => 25,
        SPACE_HOME_PLAYER if origin => 25,
        SPACE_HOME_PLAYER | SPACE_HOME_OPPONENT => 0,
        point => point,
    }
}

/// Pip distance of a straight move by `player` in the canonical frame.
pub fn distance(player: u8, from: i8, to: i8) -> i8 {
    (pip_position(player, from, true) - pip_position(player, to, false)).abs()
}

/// Space a player lands on when entering with `die`.
pub fn entry_space(player: u8, die: u8) -> i8 {
    if player == 1 {
        25 - die as i8
    } else {
        die as i8
    }
}

/// Board state in the canonical frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub spaces: [i8; BOARD_SPACES],
    pub variant: Variant,
    /// Whether each player has no checkers left waiting to enter.
    pub entered: [bool; 2],
}

impl Board {
    /// Creates the starting position of `variant`.
    pub fn new(variant: Variant) -> Self {
        let mut spaces = [0i8; BOARD_SPACES];
        if variant.enters_from_home() {
            spaces[SPACE_HOME_PLAYER as usize] = CHECKERS_PER_PLAYER;
            spaces[SPACE_HOME_OPPONENT as usize] = -CHECKERS_PER_PLAYER;
        } else {
            spaces[24] = 2;
            spaces[13] = 5;
            spaces[8] = 3;
            spaces[6] = 5;
            spaces[1] = -2;
            spaces[12] = -5;
            spaces[17] = -3;
            spaces[19] = -5;
        }
        let entered = !variant.enters_from_home();
        Board {
            spaces,
            variant,
            entered: [entered, entered],
        }
    }

    /// Number of `player`'s checkers on a canonical space.
    pub fn count(&self, player: u8, space: i8) -> i8 {
        let value = self.spaces[space as usize];
        match player {
            1 if value > 0 => value,
            2 if value < 0 => -value,
            _ => 0,
        }
    }

    /// Number of checkers of the other player on a canonical space.
    pub fn opposing(&self, player: u8, space: i8) -> i8 {
        self.count(opponent(player), space)
    }

    /// Adds `amount` (possibly negative) checkers of `player` to a space.
    pub fn add(&mut self, player: u8, space: i8, amount: i8) {
        let signed = if player == 1 { amount } else { -amount };
        self.spaces[space as usize] += signed;
    }

    pub fn has_entered(&self, player: u8) -> bool {
        self.entered[player as usize - 1]
    }

    pub fn set_entered(&mut self, player: u8, entered: bool) {
        self.entered[player as usize - 1] = entered;
    }

    /// Checkers still waiting to enter (entering variants only).
    pub fn waiting(&self, player: u8) -> i8 {
        if self.has_entered(player) {
            0
        } else {
            self.count(player, home_space(player))
        }
    }

    /// Checkers that have been borne off.
    pub fn borne_off(&self, player: u8) -> i8 {
        if self.has_entered(player) {
            self.count(player, home_space(player))
        } else {
            0
        }
    }

    /// Total checkers owned by `player` across every slot.
    pub fn checkers(&self, player: u8) -> i8 {
        (0..BOARD_SPACES as i8).map(|space| self.count(player, space)).sum()
    }

    /// Pips left before `player` has borne everything off.
    pub fn pip_count(&self, player: u8) -> u32 {
        (0..BOARD_SPACES as i8)
            .map(|space| {
                let count = self.count(player, space) as u32;
                if space == home_space(player) && self.has_entered(player) {
                    0
                } else {
                    count * pip_position(player, space, true) as u32
                }
            })
            .sum()
    }

    /// Board values as seen by `player`: their checkers positive, their home
    /// at 0 and their bar at 26.
    pub fn project(&self, player: u8) -> [i8; BOARD_SPACES] {
        if player != 2 {
            return self.spaces;
        }
        let mut projected = [0i8; BOARD_SPACES];
        for space in 0..BOARD_SPACES as i8 {
            projected[flip_space(space, 2) as usize] = -self.spaces[space as usize];
        }
        projected
    }
}
