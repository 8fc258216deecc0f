//! Match state machine
//!
//! A [`Game`] owns one match: board, players, dice, doubling cube, turn
//! pointer and replay log. Every transition validates the request first and
//! only then mutates, so a rejected command never leaves partial state.
//!
//! ```text
//! WaitingForPlayers -> RollToStart -> Roll <-> Move
//!                                     Roll  -> DoubleOffered -> Roll
//!                        (game over) -> RollToStart | MatchOver
//! ```

use crate::board::{opponent, Board, Variant, CHECKERS_PER_PLAYER};
use crate::dice::DieSource;
use crate::error::GameError;
use crate::legality::{
    apply_move, classify_win, expand_move, has_won, legal_moves, undo_move, AppliedMove, WinKind,
};
use crate::moves::{format_moves, sort_moves, Move};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    WaitingForPlayers,
    RollToStart,
    Roll,
    Move,
    DoubleOffered,
    MatchOver,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub number: u8,
    pub name: String,
    /// Points won so far in this match.
    pub points: u32,
    /// Rating snapshot supplied by the account collaborator.
    pub rating: Option<i32>,
}

impl Player {
    fn new(number: u8) -> Self {
        Player {
            number,
            name: String::new(),
            points: 0,
            rating: None,
        }
    }
}

/// Outcome of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    pub winner: u8,
    pub points: u32,
    pub kind: WinKind,
    pub resigned: bool,
    pub match_over: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rolled {
    /// One opening die has been thrown; waiting for the other player.
    Opening { die: u8 },
    /// Both opening dice matched and have been cleared.
    Tie { die: u8 },
    /// The starting player is known. `dice` is what the starter plays: the
    /// opening pair in backgammon, a fresh throw in the other variants.
    Started {
        die: u8,
        starter: u8,
        dice: Vec<u8>,
        forced_pass: bool,
    },
    /// A regular turn roll.
    Turn { dice: Vec<u8>, forced_pass: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Single-die moves applied, in the canonical frame.
    pub moves: Vec<Move>,
    pub result: Option<GameResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OkOutcome {
    DoubleAccepted { value: u32 },
    /// Acey-deucey bonus: the chosen doubles are now to be played.
    Doubles { value: u8 },
    TurnEnded { next: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub number: u8,
    pub name: String,
    pub points: u32,
    pub has_cube: bool,
    pub entered: bool,
    pub pips: u32,
    pub rating: Option<i32>,
}

/// A match as seen by one recipient. Player numbers, board spaces, cube
/// holder and roll order are all expressed in the recipient's frame, where
/// `1` is the recipient's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameView {
    pub game_id: u32,
    pub spectating: bool,
    /// The recipient's real player number, 0 for spectators.
    pub player_number: u8,
    pub player: PlayerView,
    pub opponent: PlayerView,
    pub board: Vec<i8>,
    pub phase: Phase,
    pub variant: Variant,
    pub points: u32,
    pub turn: u8,
    pub roll: [u8; 3],
    pub dice: Vec<u8>,
    pub moves: Vec<Move>,
    pub available: Vec<Move>,
    pub double_value: u32,
    pub double_player: u8,
    pub double_offered: bool,
    pub choose_doubles: bool,
    pub winner: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub board: Board,
    pub player1: Player,
    pub player2: Player,
    pub phase: Phase,
    pub variant: Variant,
    /// Points needed to win the match.
    pub points: u32,
    /// 0 until the opening roll decides who starts.
    pub turn: u8,
    /// During the opening roll, slot 0 is player 1's die and slot 1 player 2's.
    pub roll: [u8; 3],
    /// Dice not yet played this turn.
    pub dice: Vec<u8>,
    /// Dice the current moves were played from, restored by `reset`.
    turn_dice: Vec<u8>,
    pub double_value: u32,
    /// Cube holder, 0 while centred.
    pub double_player: u8,
    /// Moves applied since the last roll.
    pub moves: Vec<AppliedMove>,
    pub winner: u8,
    pub started: u64,
    pub ended: u64,
    /// The acey-deucey bonus doubles are being played.
    bonus_doubles: bool,
    /// The turn holder rolls again when the turn ends.
    reroll: bool,
    /// Lines of the game in progress.
    replay: Vec<String>,
    /// Headers and lines of finished games.
    history: Vec<String>,
}

impl Game {
    pub fn new(variant: Variant, points: u32) -> Self {
        Game {
            board: Board::new(variant),
            player1: Player::new(1),
            player2: Player::new(2),
            phase: Phase::WaitingForPlayers,
            variant,
            points: points.max(1),
            turn: 0,
            roll: [0; 3],
            dice: Vec::new(),
            turn_dice: Vec::new(),
            double_value: 1,
            double_player: 0,
            moves: Vec::new(),
            winner: 0,
            started: 0,
            ended: 0,
            bonus_doubles: false,
            reroll: false,
            replay: Vec::new(),
            history: Vec::new(),
        }
    }

    /// A fresh match between the same players with the score zeroed.
    pub fn rematch(&self) -> Game {
        let mut game = Game::new(self.variant, self.points);
        game.player1.name = self.player1.name.clone();
        game.player1.rating = self.player1.rating;
        game.player2.name = self.player2.name.clone();
        game.player2.rating = self.player2.rating;
        game
    }

    pub fn player(&self, number: u8) -> &Player {
        if number == 2 {
            &self.player2
        } else {
            &self.player1
        }
    }

    pub fn player_mut(&mut self, number: u8) -> &mut Player {
        if number == 2 {
            &mut self.player2
        } else {
            &mut self.player1
        }
    }

    /// Both seats are taken: begin the opening roll.
    pub fn start(&mut self, now: u64) {
        if self.phase == Phase::WaitingForPlayers {
            self.phase = Phase::RollToStart;
            self.started = now;
        }
    }

    pub fn is_over(&self) -> bool {
        self.phase == Phase::MatchOver
    }

    /// Legal moves of the turn holder in the canonical frame.
    pub fn legal_moves(&self) -> Vec<Move> {
        if self.phase != Phase::Move || self.turn == 0 {
            return Vec::new();
        }
        legal_moves(&self.board, self.turn, &self.dice)
    }

    /// Whether the acey-deucey 1-2 bonus is waiting for a doubles choice.
    pub fn choose_doubles(&self) -> bool {
        let mut pair = [self.roll[0], self.roll[1]];
        pair.sort_unstable();
        self.variant == Variant::AceyDeucey
            && self.phase == Phase::Move
            && !self.bonus_doubles
            && self.roll[2] == 0
            && pair == [1, 2]
            && self.dice.is_empty()
    }

    fn require_turn(&self, player: u8) -> Result<(), GameError> {
        if self.turn != player {
            return Err(GameError::NotYourTurn);
        }
        Ok(())
    }

    fn phase_error(&self) -> GameError {
        match self.phase {
            Phase::WaitingForPlayers | Phase::RollToStart => GameError::NotStarted,
            Phase::MatchOver => GameError::MatchOver,
            Phase::DoubleOffered => GameError::DoublePending,
            Phase::Roll => GameError::NotRolled,
            Phase::Move => GameError::AlreadyRolled,
        }
    }

    fn throw(&mut self, source: &mut dyn DieSource) {
        let count = self.variant.dice_count();
        let mut roll = [0u8; 3];
        for slot in roll.iter_mut().take(count) {
            *slot = source.roll_die();
        }
        self.roll = roll;
        self.dice = if count == 2 && roll[0] == roll[1] && self.variant.doubles_played_twice() {
            vec![roll[0]; 4]
        } else {
            roll[..count].to_vec()
        };
        self.turn_dice = self.dice.clone();
        self.moves.clear();
        self.phase = Phase::Move;
    }

    fn thrown(&self) -> Vec<u8> {
        self.roll.iter().copied().filter(|d| *d != 0).collect()
    }

    /// Ends the turn at once when the fresh roll cannot be played.
    fn pass_if_blocked(&mut self) -> bool {
        if self.legal_moves().is_empty() {
            self.end_turn();
            true
        } else {
            false
        }
    }

    pub fn roll(&mut self, player: u8, source: &mut dyn DieSource) -> Result<Rolled, GameError> {
        match self.phase {
            Phase::RollToStart => {
                let slot = player as usize - 1;
                if self.roll[slot] != 0 {
                    return Err(GameError::AlreadyRolled);
                }
                let die = source.roll_die();
                self.roll[slot] = die;
                if self.roll[0] == 0 || self.roll[1] == 0 {
                    return Ok(Rolled::Opening { die });
                }
                if self.roll[0] == self.roll[1] {
                    self.roll = [0; 3];
                    return Ok(Rolled::Tie { die });
                }

                self.turn = match self.roll[0].cmp(&self.roll[1]) {
                    std::cmp::Ordering::Greater => 1,
                    std::cmp::Ordering::Less => 2,
                    std::cmp::Ordering::Equal => {
                        return Err(GameError::Invariant(
                            "opening roll produced no starting player".to_string(),
                        ))
                    }
                };
                if self.variant == Variant::Backgammon {
                    self.dice = vec![self.roll[0], self.roll[1]];
                    self.turn_dice = self.dice.clone();
                    self.moves.clear();
                    self.phase = Phase::Move;
                } else {
                    self.throw(source);
                }
                let dice = self.thrown();
                Ok(Rolled::Started {
                    die,
                    starter: self.turn,
                    dice,
                    forced_pass: self.pass_if_blocked(),
                })
            }
            Phase::Roll => {
                self.require_turn(player)?;
                self.throw(source);
                let dice = self.thrown();
                Ok(Rolled::Turn {
                    dice,
                    forced_pass: self.pass_if_blocked(),
                })
            }
            _ => Err(self.phase_error()),
        }
    }

    /// Plays moves given in `player`'s own frame. All moves are applied or
    /// none are.
    pub fn add_moves(&mut self, player: u8, requested: &[Move]) -> Result<MoveOutcome, GameError> {
        if self.phase != Phase::Move {
            return Err(match self.phase {
                Phase::Roll => GameError::NotRolled,
                _ => self.phase_error(),
            });
        }
        self.require_turn(player)?;
        if requested.is_empty() {
            return Err(GameError::IllegalMove("no moves given".to_string()));
        }
        if let Some(mv) = requested.iter().find(|mv| !mv.in_range()) {
            return Err(GameError::IllegalMove(mv.to_string()));
        }

        let mut board = self.board.clone();
        let mut dice = self.dice.clone();
        let mut applied = Vec::new();
        for mv in requested {
            let chain = expand_move(&board, player, &dice, mv.flipped(player))
                .ok_or_else(|| GameError::IllegalMove(mv.to_string()))?;
            for play in chain {
                applied.push(apply_move(&mut board, player, play.mv));
                if let Some(index) = dice.iter().position(|d| *d == play.die) {
                    dice.remove(index);
                }
            }
            if has_won(&board, player) {
                break;
            }
        }

        for number in [1, 2] {
            if board.checkers(number) != CHECKERS_PER_PLAYER {
                return Err(GameError::Invariant(format!(
                    "player {} has {} checkers",
                    number,
                    board.checkers(number)
                )));
            }
        }

        self.board = board;
        self.dice = dice;
        let moves = applied.iter().map(|a| a.mv).collect();
        self.moves.extend(applied);

        let result = if has_won(&self.board, player) {
            let line = self.turn_line();
            self.replay.push(line);
            let kind = classify_win(&self.board, player);
            Some(self.finish_game(player, self.double_value * kind.multiplier(), kind, false))
        } else {
            None
        };
        Ok(MoveOutcome { moves, result })
    }

    /// Takes back every move since the last roll. Returns the undo moves in
    /// the canonical frame.
    pub fn reset(&mut self, player: u8) -> Result<Vec<Move>, GameError> {
        if self.phase != Phase::Move {
            return Err(self.phase_error());
        }
        self.require_turn(player)?;
        if self.moves.is_empty() {
            return Err(GameError::NothingToReset);
        }

        let mut board = self.board.clone();
        for applied in self.moves.iter().rev() {
            if !undo_move(&mut board, player, applied) {
                return Err(GameError::IllegalMove(format!(
                    "cannot undo {}",
                    applied.mv.flipped(player)
                )));
            }
        }
        self.board = board;
        self.dice = self.turn_dice.clone();
        Ok(self.moves.drain(..).rev().map(|a| a.mv.inverse()).collect())
    }

    /// Accepts a pending double, or confirms the end of the turn.
    pub fn ok(&mut self, player: u8, doubles: Option<u8>) -> Result<OkOutcome, GameError> {
        match self.phase {
            Phase::DoubleOffered => {
                if player == self.turn {
                    return Err(GameError::DoublePending);
                }
                self.double_value *= 2;
                self.double_player = player;
                self.phase = Phase::Roll;
                self.replay
                    .push(format!("{} d {} 1", self.turn, self.double_value));
                Ok(OkOutcome::DoubleAccepted {
                    value: self.double_value,
                })
            }
            Phase::Move => {
                self.require_turn(player)?;
                if !self.legal_moves().is_empty() {
                    return Err(GameError::MovesRemaining);
                }
                if self.choose_doubles() {
                    let value = doubles
                        .filter(|v| (1..=6).contains(v))
                        .ok_or(GameError::ChooseDoubles)?;
                    let line = self.turn_line();
                    self.replay.push(line);
                    self.roll = [value, value, 0];
                    self.dice = vec![value; 4];
                    self.turn_dice = self.dice.clone();
                    self.moves.clear();
                    self.bonus_doubles = true;
                    self.reroll = true;
                    return Ok(OkOutcome::Doubles { value });
                }
                self.end_turn();
                Ok(OkOutcome::TurnEnded { next: self.turn })
            }
            _ => Err(self.phase_error()),
        }
    }

    pub fn offer_double(&mut self, player: u8) -> Result<(), GameError> {
        if self.phase != Phase::Roll {
            return Err(self.phase_error());
        }
        if !self.variant.has_doubling_cube() {
            return Err(GameError::CannotDouble("this variant has no doubling cube"));
        }
        self.require_turn(player)?;
        if self.double_player != 0 && self.double_player != player {
            return Err(GameError::CannotDouble("your opponent holds the cube"));
        }
        self.phase = Phase::DoubleOffered;
        self.replay
            .push(format!("{} d {} 0", player, self.double_value * 2));
        Ok(())
    }

    /// Declines a pending double, or concedes during one's own turn. Either
    /// way the game is scored at the current cube value.
    pub fn resign(&mut self, player: u8) -> Result<GameResult, GameError> {
        let winner = match self.phase {
            Phase::DoubleOffered if player != self.turn => self.turn,
            Phase::Roll | Phase::Move if player == self.turn => opponent(player),
            Phase::MatchOver => return Err(GameError::MatchOver),
            _ => return Err(GameError::CannotResign),
        };
        self.replay.push(format!("{} t", player));
        Ok(self.finish_game(winner, self.double_value, WinKind::Single, true))
    }

    fn turn_line(&self) -> String {
        let dice: Vec<String> = self
            .roll
            .iter()
            .filter(|d| **d != 0)
            .map(|d| d.to_string())
            .collect();
        let moves: Vec<Move> = self.moves.iter().map(|a| a.mv.flipped(self.turn)).collect();
        let mut line = format!("{} r {}", self.turn, dice.join("-"));
        if !moves.is_empty() {
            line.push(' ');
            line.push_str(&format_moves(&moves));
        }
        line
    }

    fn end_turn(&mut self) {
        let line = self.turn_line();
        self.replay.push(line);
        self.moves.clear();
        self.dice.clear();
        self.turn_dice.clear();
        self.roll = [0; 3];
        if self.reroll {
            self.reroll = false;
        } else {
            self.turn = opponent(self.turn);
        }
        self.bonus_doubles = false;
        self.phase = Phase::Roll;
    }

    fn header_line(&self, winner: u8) -> String {
        format!(
            "i {} {} {} {} {} {} {} {} {}",
            self.started,
            self.player1.name,
            self.player2.name,
            self.points,
            self.player1.points,
            self.player2.points,
            winner,
            self.double_value,
            self.variant.flag()
        )
    }

    fn finish_game(&mut self, winner: u8, points: u32, kind: WinKind, resigned: bool) -> GameResult {
        self.player_mut(winner).points += points;
        let match_over = self.player(winner).points >= self.points;

        self.history.push(self.header_line(winner));
        self.history.append(&mut self.replay);

        if match_over {
            self.phase = Phase::MatchOver;
            self.winner = winner;
            self.dice.clear();
            self.moves.clear();
        } else {
            self.board = Board::new(self.variant);
            self.phase = Phase::RollToStart;
            self.turn = 0;
            self.roll = [0; 3];
            self.dice.clear();
            self.turn_dice.clear();
            self.moves.clear();
            self.double_value = 1;
            self.double_player = 0;
            self.bonus_doubles = false;
            self.reroll = false;
        }

        GameResult {
            winner,
            points,
            kind,
            resigned,
            match_over,
        }
    }

    /// Replay of every finished game followed by the game in progress.
    pub fn replay_log(&self) -> Vec<String> {
        let mut log = self.history.clone();
        log.extend(self.replay.iter().cloned());
        log
    }

    fn player_view(&self, number: u8) -> PlayerView {
        let player = self.player(number);
        PlayerView {
            number,
            name: player.name.clone(),
            points: player.points,
            has_cube: self.double_player == number,
            entered: self.board.has_entered(number),
            pips: self.board.pip_count(number),
            rating: player.rating,
        }
    }

    /// Projects the match for a recipient on side `perspective` (1 or 2).
    pub fn view(&self, perspective: u8) -> GameView {
        let perspective = if perspective == 2 { 2 } else { 1 };
        let relative = |number: u8| {
            if perspective == 2 && number != 0 {
                opponent(number)
            } else {
                number
            }
        };

        let mut roll = self.roll;
        if perspective == 2 {
            roll.swap(0, 1);
        }

        let available = if self.turn == perspective {
            let mut moves: Vec<Move> = self
                .legal_moves()
                .into_iter()
                .map(|m| m.flipped(perspective))
                .collect();
            sort_moves(&mut moves);
            moves
        } else {
            Vec::new()
        };

        GameView {
            game_id: 0,
            spectating: false,
            player_number: perspective,
            player: self.player_view(perspective),
            opponent: self.player_view(opponent(perspective)),
            board: self.board.project(perspective).to_vec(),
            phase: self.phase,
            variant: self.variant,
            points: self.points,
            turn: relative(self.turn),
            roll,
            dice: self.dice.clone(),
            moves: self.moves.iter().map(|a| a.mv.flipped(perspective)).collect(),
            available,
            double_value: self.double_value,
            double_player: relative(self.double_player),
            double_offered: self.phase == Phase::DoubleOffered,
            choose_doubles: self.choose_doubles(),
            winner: relative(self.winner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{BOARD_SPACES, SPACE_BAR_PLAYER, SPACE_HOME_OPPONENT};
    use crate::dice::LoadedDice;

    fn new_game(variant: Variant, points: u32) -> Game {
        let mut game = Game::new(variant, points);
        game.player1.name = "alice".to_string();
        game.player2.name = "bob".to_string();
        game.start(1_700_000_000);
        game
    }

    /// A backgammon game where player 1 has won the opening roll with 6-1.
    fn started_game(points: u32) -> Game {
        let mut game = new_game(Variant::Backgammon, points);
        let mut dice = LoadedDice::new([6, 1]);
        assert_eq!(game.roll(1, &mut dice), Ok(Rolled::Opening { die: 6 }));
        assert_eq!(
            game.roll(2, &mut dice),
            Ok(Rolled::Started {
                die: 1,
                starter: 1,
                dice: vec![6, 1],
                forced_pass: false
            })
        );
        game
    }

    fn m(from: i8, to: i8) -> Move {
        Move::new(from, to)
    }

    #[test]
    fn test_waiting_until_started() {
        let mut game = Game::new(Variant::Backgammon, 3);
        let mut dice = LoadedDice::new([4]);
        assert_eq!(game.phase, Phase::WaitingForPlayers);
        assert_eq!(game.roll(1, &mut dice), Err(GameError::NotStarted));
        game.start(10);
        assert_eq!(game.phase, Phase::RollToStart);
        assert_eq!(game.started, 10);
    }

    #[test]
    fn test_opening_roll_with_tie() {
        let mut game = new_game(Variant::Backgammon, 1);
        let mut dice = LoadedDice::new([4, 4, 2, 5]);
        assert_eq!(game.roll(1, &mut dice), Ok(Rolled::Opening { die: 4 }));
        assert_eq!(game.roll(1, &mut dice), Err(GameError::AlreadyRolled));
        assert_eq!(game.roll(2, &mut dice), Ok(Rolled::Tie { die: 4 }));
        assert_eq!(game.roll, [0, 0, 0]);
        assert_eq!(game.turn, 0);

        assert_eq!(game.roll(2, &mut dice), Ok(Rolled::Opening { die: 2 }));
        assert_eq!(game.roll, [0, 2, 0]);
        assert_eq!(
            game.roll(1, &mut dice),
            Ok(Rolled::Started {
                die: 5,
                starter: 1,
                dice: vec![5, 2],
                forced_pass: false
            })
        );
        assert_eq!(game.turn, 1);
        assert_eq!(game.phase, Phase::Move);
        assert_eq!(game.dice, vec![5, 2]);
    }

    #[test]
    fn test_acey_deucey_rerolls_after_opening() {
        let mut game = new_game(Variant::AceyDeucey, 1);
        let mut dice = LoadedDice::new([2, 5, 3, 4]);
        game.roll(1, &mut dice).unwrap();
        assert_eq!(
            game.roll(2, &mut dice),
            Ok(Rolled::Started {
                die: 5,
                starter: 2,
                dice: vec![3, 4],
                forced_pass: false
            })
        );
        assert_eq!(game.turn, 2);
        assert_eq!(game.roll, [3, 4, 0]);
        assert_eq!(game.dice, vec![3, 4]);
    }

    #[test]
    fn test_tabula_throws_three_dice() {
        let mut game = new_game(Variant::Tabula, 1);
        let mut dice = LoadedDice::new([6, 1, 2, 2, 3]);
        game.roll(1, &mut dice).unwrap();
        game.roll(2, &mut dice).unwrap();
        assert_eq!(game.turn, 1);
        assert_eq!(game.roll, [2, 2, 3]);
        assert_eq!(game.dice, vec![2, 2, 3]);
    }

    #[test]
    fn test_move_and_end_turn() {
        let mut game = started_game(1);
        assert_eq!(game.roll(1, &mut LoadedDice::new([1])), Err(GameError::AlreadyRolled));
        assert_eq!(game.add_moves(2, &[m(1, 2)]), Err(GameError::NotYourTurn));

        let outcome = game.add_moves(1, &[m(13, 7)]).unwrap();
        assert_eq!(outcome.moves, vec![m(13, 7)]);
        assert_eq!(game.ok(1, None), Err(GameError::MovesRemaining));

        game.add_moves(1, &[m(8, 7)]).unwrap();
        assert!(game.legal_moves().is_empty());
        assert_eq!(game.ok(1, None), Ok(OkOutcome::TurnEnded { next: 2 }));
        assert_eq!(game.phase, Phase::Roll);
        assert_eq!(game.turn, 2);
        assert_eq!(game.replay_log(), vec!["1 r 6-1 13/7 8/7".to_string()]);
    }

    #[test]
    fn test_moves_are_atomic() {
        let mut game = started_game(1);
        let before = game.clone();
        let err = game.add_moves(1, &[m(13, 7), m(6, 1)]).unwrap_err();
        assert_eq!(err, GameError::IllegalMove("6/1".to_string()));
        assert_eq!(game, before);
    }

    #[test]
    fn test_spaces_off_the_board_are_rejected() {
        let mut game = started_game(1);
        let before = game.clone();
        let err = game.add_moves(1, &[m(24, -128)]).unwrap_err();
        assert_eq!(err, GameError::IllegalMove("24/-128".to_string()));
        assert_eq!(game, before);

        let mut game = new_game(Variant::Backgammon, 1);
        let mut dice = LoadedDice::new([1, 6]);
        game.roll(1, &mut dice).unwrap();
        game.roll(2, &mut dice).unwrap();
        let before = game.clone();
        assert!(matches!(
            game.add_moves(2, &[m(-110, 5)]),
            Err(GameError::IllegalMove(_))
        ));
        assert_eq!(game, before);
    }

    #[test]
    fn test_multi_die_move() {
        let mut game = started_game(1);
        let outcome = game.add_moves(1, &[m(13, 6)]).unwrap();
        assert_eq!(outcome.moves.len(), 2);
        assert!(game.dice.is_empty());
        assert_eq!(game.board.count(1, 6), 6);
    }

    #[test]
    fn test_reset_round_trip() {
        let mut game = started_game(1);
        let start = game.board.clone();
        game.add_moves(1, &[m(13, 7), m(8, 7)]).unwrap();
        assert_ne!(game.board, start);
        let undone = game.reset(1).unwrap();
        assert_eq!(undone, vec![m(7, 8), m(7, 13)]);
        assert_eq!(game.board, start);
        assert_eq!(game.dice, vec![6, 1]);
        assert!(game.moves.is_empty());
        assert_eq!(game.reset(1), Err(GameError::NothingToReset));
    }

    #[test]
    fn test_reset_restores_hit_checker() {
        let mut game = started_game(1);
        game.board.add(2, 12, -1);
        game.board.add(2, 7, 1);
        let start = game.board.clone();
        game.add_moves(1, &[m(13, 7)]).unwrap();
        assert_eq!(game.board.count(2, 27), 1);
        game.reset(1).unwrap();
        assert_eq!(game.board, start);
    }

    #[test]
    fn test_player_two_moves_in_own_frame() {
        let mut game = new_game(Variant::Backgammon, 1);
        let mut dice = LoadedDice::new([1, 6]);
        game.roll(1, &mut dice).unwrap();
        game.roll(2, &mut dice).unwrap();
        assert_eq!(game.turn, 2);
        // Player 2 sees the standard opening and plays 13/7 8/7 from it.
        let outcome = game.add_moves(2, &[m(13, 7), m(8, 7)]).unwrap();
        assert_eq!(outcome.moves, vec![m(12, 18), m(17, 18)]);
        assert_eq!(game.board.count(2, 18), 2);
        let view = game.view(2);
        assert_eq!(view.board[7], 2);
        assert_eq!(view.moves, vec![m(13, 7), m(8, 7)]);
    }

    #[test]
    fn test_forced_pass() {
        let mut game = started_game(1);
        game.add_moves(1, &[m(13, 7), m(8, 7)]).unwrap();
        game.ok(1, None).unwrap();

        // Put a player 2 checker on the bar behind a closed board.
        game.board.spaces = [0; BOARD_SPACES];
        for space in 1..=6 {
            game.board.add(1, space, 2);
        }
        game.board.add(1, 0, 3);
        game.board.add(2, 27, 1);
        game.board.add(2, SPACE_HOME_OPPONENT, 14);

        let mut dice = LoadedDice::new([3, 5]);
        assert_eq!(
            game.roll(2, &mut dice),
            Ok(Rolled::Turn {
                dice: vec![3, 5],
                forced_pass: true
            })
        );
        assert_eq!(game.turn, 1);
        assert_eq!(game.phase, Phase::Roll);
        assert_eq!(game.replay_log().last().unwrap(), "2 r 3-5");
    }

    #[test]
    fn test_double_accepted() {
        let mut game = started_game(5);
        game.add_moves(1, &[m(13, 7), m(8, 7)]).unwrap();
        game.ok(1, None).unwrap();

        assert_eq!(game.offer_double(1), Err(GameError::NotYourTurn));
        game.offer_double(2).unwrap();
        assert_eq!(game.phase, Phase::DoubleOffered);
        assert_eq!(game.roll(2, &mut LoadedDice::new([3])), Err(GameError::DoublePending));
        assert_eq!(game.ok(2, None), Err(GameError::DoublePending));

        assert_eq!(game.ok(1, None), Ok(OkOutcome::DoubleAccepted { value: 2 }));
        assert_eq!(game.double_value, 2);
        assert_eq!(game.double_player, 1);
        assert_eq!(game.phase, Phase::Roll);
        assert_eq!(game.turn, 2);

        // Only the new holder may redouble.
        let mut dice = LoadedDice::new([3, 4]);
        game.roll(2, &mut dice).unwrap();
        let legal = game.view(2).available;
        game.add_moves(2, &legal[..1]).unwrap();
        let legal = game.view(2).available;
        game.add_moves(2, &legal[..1]).unwrap();
        game.ok(2, None).unwrap();
        game.offer_double(1).unwrap();
        game.ok(2, None).unwrap();
        assert_eq!(game.double_value, 4);
        assert_eq!(game.double_player, 2);
        assert_eq!(
            game.offer_double(1),
            Err(GameError::CannotDouble("your opponent holds the cube"))
        );
    }

    #[test]
    fn test_double_only_before_rolling() {
        let mut game = started_game(5);
        assert_eq!(game.offer_double(1), Err(GameError::AlreadyRolled));
        let mut tabula = new_game(Variant::Tabula, 1);
        tabula.phase = Phase::Roll;
        tabula.turn = 1;
        assert!(matches!(tabula.offer_double(1), Err(GameError::CannotDouble(_))));
    }

    #[test]
    fn test_declined_double_scores_pre_double_value() {
        let mut game = started_game(5);
        game.add_moves(1, &[m(13, 7), m(8, 7)]).unwrap();
        game.ok(1, None).unwrap();
        game.offer_double(2).unwrap();

        let result = game.resign(1).unwrap();
        assert_eq!(result.winner, 2);
        assert_eq!(result.points, 1);
        assert!(result.resigned);
        assert!(!result.match_over);
        assert_eq!(game.player2.points, 1);
        assert_eq!(game.phase, Phase::RollToStart);
        assert_eq!(game.board, Board::new(Variant::Backgammon));
        assert_eq!(game.double_value, 1);
    }

    #[test]
    fn test_resign_only_on_own_turn() {
        let mut game = started_game(1);
        assert_eq!(game.resign(2), Err(GameError::CannotResign));
        let result = game.resign(1).unwrap();
        assert_eq!(result.winner, 2);
        assert!(result.match_over);
        assert_eq!(game.phase, Phase::MatchOver);
        assert_eq!(game.winner, 2);
        assert_eq!(game.resign(1), Err(GameError::MatchOver));

        let log = game.replay_log();
        assert_eq!(log[0], "i 1700000000 alice bob 1 0 1 2 1 0");
        assert_eq!(log[1], "1 t");
    }

    #[test]
    fn test_bear_off_win_is_scored() {
        let mut game = started_game(3);
        game.board.spaces = [0; BOARD_SPACES];
        game.board.add(1, 0, 14);
        game.board.add(1, 1, 1);
        game.board.add(2, 20, 15);

        let outcome = game.add_moves(1, &[m(1, 0)]).unwrap();
        let result = outcome.result.unwrap();
        assert_eq!(result.winner, 1);
        assert_eq!(result.kind, WinKind::Gammon);
        assert_eq!(result.points, 2);
        assert!(!result.match_over);
        assert_eq!(game.player1.points, 2);
        assert_eq!(game.phase, Phase::RollToStart);
        assert_eq!(game.turn, 0);
    }

    #[test]
    fn test_acey_deucey_bonus_doubles() {
        let mut game = new_game(Variant::AceyDeucey, 1);
        let mut dice = LoadedDice::new([5, 2, 1, 2]);
        game.roll(1, &mut dice).unwrap();
        game.roll(2, &mut dice).unwrap();
        assert_eq!(game.turn, 1);
        assert_eq!(game.roll, [1, 2, 0]);

        game.add_moves(1, &[m(0, 24), m(0, 23)]).unwrap();
        assert!(game.choose_doubles());
        assert_eq!(game.ok(1, None), Err(GameError::ChooseDoubles));
        assert_eq!(game.ok(1, Some(9)), Err(GameError::ChooseDoubles));
        assert_eq!(game.ok(1, Some(3)), Ok(OkOutcome::Doubles { value: 3 }));
        assert_eq!(game.dice, vec![3, 3, 3, 3]);
        assert!(!game.choose_doubles());

        game.add_moves(1, &[m(0, 22), m(0, 22), m(0, 22), m(0, 22)])
            .unwrap();
        assert_eq!(game.ok(1, None), Ok(OkOutcome::TurnEnded { next: 1 }));
        assert_eq!(game.turn, 1);
        assert_eq!(game.phase, Phase::Roll);
        assert_eq!(
            game.replay_log(),
            vec![
                "1 r 1-2 off/24 off/23".to_string(),
                "1 r 3-3 off/22 off/22 off/22 off/22".to_string(),
            ]
        );
    }

    #[test]
    fn test_view_for_player_two_is_flipped() {
        let mut game = started_game(1);
        game.add_moves(1, &[m(24, 18)]).unwrap();
        game.double_player = 1;
        let view = game.view(2);
        assert_eq!(view.turn, 2);
        assert_eq!(view.roll, [1, 6, 0]);
        assert_eq!(view.double_player, 2);
        assert!(view.available.is_empty());
        assert_eq!(view.moves, vec![m(1, 7)]);
        assert_eq!(view.player.name, "bob");
        assert_eq!(view.opponent.name, "alice");
        assert!(view.opponent.has_cube);
        // Player 1's checker on 18 shows on 7 as an opposing checker.
        assert_eq!(view.board[7], -1);

        let own = game.view(1);
        assert_eq!(own.turn, 1);
        assert_eq!(own.roll, [6, 1, 0]);
        assert_eq!(own.available, game.legal_moves());
    }

    #[test]
    fn test_bar_entry_in_player_frame() {
        let mut game = started_game(1);
        game.board.add(1, 24, -1);
        game.board.add(1, SPACE_BAR_PLAYER, 1);
        assert_eq!(
            game.add_moves(1, &[m(13, 7)]),
            Err(GameError::IllegalMove("13/7".to_string()))
        );
        game.add_moves(1, &[m(26, 24)]).unwrap();
    }

    #[test]
    fn test_rematch_keeps_names_and_clears_score() {
        let mut game = started_game(1);
        game.resign(1).unwrap();
        let next = game.rematch();
        assert_eq!(next.player1.name, "alice");
        assert_eq!(next.player2.name, "bob");
        assert_eq!(next.player2.points, 0);
        assert_eq!(next.phase, Phase::WaitingForPlayers);
        assert!(next.replay_log().is_empty());
    }
}
