//! Move legality engine
//!
//! Everything here works in the canonical frame (see [`crate::board`]).
//!
//! Legal moves are derived in two steps:
//! 1. [`single_moves`] lists every placement one die allows on its own:
//!    bar entry first, entry from home for entering variants, then ordinary
//!    moves and bearing off.
//! 2. [`legal_plays`] searches the sequences the remaining dice allow and keeps
//!    only first moves that start a sequence using as many dice as possible.
//!    When only one die of the roll can be used, the highest playable die wins.
//!
//! Because every candidate is re-evaluated on the board it would be played
//! on, bearing-off eligibility is always checked against the position after
//! the earlier moves of the turn.

use crate::board::{
    bar_space, distance, entry_space, home_range, home_space, opponent, Board, CHECKERS_PER_PLAYER,
};
use crate::moves::{sort_moves, Move};
use serde::{Deserialize, Serialize};

/// A single-die move together with the die that pays for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Play {
    pub mv: Move,
    pub die: u8,
}

/// A move that has been applied to a board, with enough detail to undo it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMove {
    pub mv: Move,
    /// An opposing blot was sent to the bar.
    pub hit: bool,
    /// This move entered the player's last waiting checker.
    pub entered: bool,
}

/// Game outcome classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WinKind {
    Single,
    Gammon,
    Backgammon,
}

impl WinKind {
    pub fn multiplier(self) -> u32 {
        match self {
            WinKind::Single => 1,
            WinKind::Gammon => 2,
            WinKind::Backgammon => 3,
        }
    }
}

/// A point is closed to `player` when it holds two or more opposing checkers.
fn is_open(board: &Board, player: u8, space: i8) -> bool {
    board.opposing(player, space) <= 1
}

fn step(player: u8, space: i8, die: u8) -> i8 {
    if player == 1 {
        space - die as i8
    } else {
        space + die as i8
    }
}

/// Whether `player` has a checker on a point farther from home than `space`.
fn checkers_behind(board: &Board, player: u8, space: i8) -> bool {
    let behind = if player == 1 {
        (space + 1)..=24
    } else {
        1..=(space - 1)
    };
    behind.into_iter().any(|s| board.count(player, s) > 0)
}

/// Bearing off requires an empty bar, no checkers waiting to enter and every
/// remaining checker inside the home range.
pub fn may_bear_off(board: &Board, player: u8) -> bool {
    if !board.has_entered(player) || board.count(player, bar_space(player)) > 0 {
        return false;
    }
    let home = home_range(player);
    (1..=24).all(|space| home.contains(&space) || board.count(player, space) == 0)
}

/// Every placement a single die allows, ignoring the other dice.
pub fn single_moves(board: &Board, player: u8, die: u8) -> Vec<Move> {
    let mut moves = Vec::new();
    let bar = bar_space(player);
    if board.count(player, bar) > 0 {
        let target = entry_space(player, die);
        if is_open(board, player, target) {
            moves.push(Move::new(bar, target));
        }
        return moves;
    }

    let home = home_space(player);
    if board.waiting(player) > 0 {
        let target = entry_space(player, die);
        if is_open(board, player, target) {
            moves.push(Move::new(home, target));
        }
    }

    let bear_off = may_bear_off(board, player);
    for space in 1..=24 {
        if board.count(player, space) == 0 {
            continue;
        }
        let target = step(player, space, die);
        if (1..=24).contains(&target) {
            if is_open(board, player, target) {
                moves.push(Move::new(space, target));
            }
        } else if bear_off {
            let exact = target == 0 || target == 25;
            if exact || !checkers_behind(board, player, space) {
                moves.push(Move::new(space, home));
            }
        }
    }
    moves
}

/// Moves a checker, hitting a lone opposing checker on the target point.
///
/// The caller is responsible for legality.
pub fn apply_move(board: &mut Board, player: u8, mv: Move) -> AppliedMove {
    let home = home_space(player);
    board.add(player, mv.from, -1);

    let mut entered = false;
    if mv.from == home && !board.has_entered(player) && board.count(player, home) == 0 {
        board.set_entered(player, true);
        entered = true;
    }

    let mut hit = false;
    if mv.to != home && board.opposing(player, mv.to) == 1 {
        let other = opponent(player);
        board.add(other, mv.to, -1);
        board.add(other, bar_space(other), 1);
        hit = true;
    }
    board.add(player, mv.to, 1);

    AppliedMove { mv, hit, entered }
}

/// Reverses an applied move. Returns `false`, leaving the board untouched,
/// when the current position cannot have resulted from that move.
pub fn undo_move(board: &mut Board, player: u8, applied: &AppliedMove) -> bool {
    let mv = applied.mv;
    let other = opponent(player);
    if board.count(player, mv.to) == 0 {
        return false;
    }
    if applied.hit && (board.count(other, bar_space(other)) == 0 || board.count(player, mv.to) != 1) {
        return false;
    }

    board.add(player, mv.to, -1);
    board.add(player, mv.from, 1);
    if applied.hit {
        board.add(other, bar_space(other), -1);
        board.add(other, mv.to, 1);
    }
    if applied.entered {
        board.set_entered(player, false);
    }
    true
}

fn without_die(dice: &[u8], index: usize) -> Vec<u8> {
    let mut rest = dice.to_vec();
    rest.remove(index);
    rest
}

/// Indices of the first occurrence of each distinct die value.
fn distinct_dice(dice: &[u8]) -> impl Iterator<Item = (usize, u8)> + '_ {
    dice.iter()
        .enumerate()
        .filter(move |(index, die)| !dice[..*index].contains(*die))
        .map(|(index, die)| (index, *die))
}

/// Greatest number of `dice` that can be played in sequence.
fn max_playable(board: &Board, player: u8, dice: &[u8]) -> usize {
    let mut best = 0;
    for (index, die) in distinct_dice(dice) {
        let rest = without_die(dice, index);
        for mv in single_moves(board, player, die) {
            let mut next = board.clone();
            apply_move(&mut next, player, mv);
            let depth = 1 + max_playable(&next, player, &rest);
            if depth > best {
                best = depth;
                if best == dice.len() {
                    return best;
                }
            }
        }
    }
    best
}

/// Single-die plays that begin a sequence using the most dice possible.
pub fn legal_plays(board: &Board, player: u8, dice: &[u8]) -> Vec<Play> {
    let mut candidates = Vec::new();
    let mut best = 0;
    for (index, die) in distinct_dice(dice) {
        let rest = without_die(dice, index);
        for mv in single_moves(board, player, die) {
            let mut next = board.clone();
            apply_move(&mut next, player, mv);
            let depth = 1 + max_playable(&next, player, &rest);
            best = best.max(depth);
            candidates.push((Play { mv, die }, depth));
        }
    }

    let mut plays: Vec<Play> = candidates
        .into_iter()
        .filter(|(_, depth)| *depth == best)
        .map(|(play, _)| play)
        .collect();

    if best == 1 {
        if let Some(high) = plays.iter().map(|play| play.die).max() {
            plays.retain(|play| play.die == high);
        }
    }
    plays.sort_by_key(|play| play.die);
    plays
}

/// Legal moves for `player` with the unplayed `dice`, in display order.
/// An empty list means no die can be played.
pub fn legal_moves(board: &Board, player: u8, dice: &[u8]) -> Vec<Move> {
    let mut moves: Vec<Move> = legal_plays(board, player, dice)
        .into_iter()
        .map(|play| play.mv)
        .collect();
    sort_moves(&mut moves);
    moves
}

/// Pips still to travel from `space` before the checker is borne off.
fn remaining(player: u8, space: i8) -> i8 {
    if space == home_space(player) {
        0
    } else {
        distance(player, space, home_space(player))
    }
}

/// Resolves a requested move into legal single-die plays.
///
/// A move whose distance matches an unplayed die resolves to one play; a
/// longer move resolves to a chain of plays through intermediate points, each
/// of which must be legal on the board it is played on.
pub fn expand_move(board: &Board, player: u8, dice: &[u8], mv: Move) -> Option<Vec<Play>> {
    if dice.is_empty() || mv.from == mv.to {
        return None;
    }
    let target_left = remaining(player, mv.to);
    for play in legal_plays(board, player, dice) {
        if play.mv.from != mv.from {
            continue;
        }
        if play.mv.to == mv.to {
            return Some(vec![play]);
        }
        if play.mv.to == home_space(player) || remaining(player, play.mv.to) <= target_left {
            continue;
        }

        let mut next = board.clone();
        apply_move(&mut next, player, play.mv);
        let index = dice.iter().position(|d| *d == play.die)?;
        let rest = without_die(dice, index);
        if let Some(mut chain) = expand_move(&next, player, &rest, Move::new(play.mv.to, mv.to)) {
            chain.insert(0, play);
            return Some(chain);
        }
    }
    None
}

/// Whether `player` has borne off every checker.
pub fn has_won(board: &Board, player: u8) -> bool {
    board.borne_off(player) == CHECKERS_PER_PLAYER
}

/// Classifies a finished game won by `winner`.
///
/// Backgammon: the loser has a checker on the bar or in the winner's home
/// board. Gammon: the loser has not borne off a checker.
///
/// Entering variants score in the same three tiers rather than per checker:
/// any checker still waiting to enter makes a backgammon, however many there
/// are.
pub fn classify_win(board: &Board, winner: u8) -> WinKind {
    let loser = opponent(winner);
    if board.variant.enters_from_home() {
        return if board.waiting(loser) > 0 {
            WinKind::Backgammon
        } else if board.borne_off(loser) == 0 {
            WinKind::Gammon
        } else {
            WinKind::Single
        };
    }

    let on_bar = board.count(loser, bar_space(loser)) > 0;
    let in_winner_home = home_range(winner).any(|space| board.count(loser, space) > 0);
    if on_bar || in_winner_home {
        WinKind::Backgammon
    } else if board.borne_off(loser) == 0 {
        WinKind::Gammon
    } else {
        WinKind::Single
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Variant, BOARD_SPACES, SPACE_BAR_PLAYER, SPACE_HOME_OPPONENT};
    use crate::dice::{DieSource, RandomDice};

    fn empty_board() -> Board {
        Board {
            spaces: [0; BOARD_SPACES],
            variant: Variant::Backgammon,
            entered: [true, true],
        }
    }

    #[test]
    fn test_opening_six_five() {
        let board = Board::new(Variant::Backgammon);
        let moves = legal_moves(&board, 1, &[6, 5]);

        assert!(moves.contains(&Move::new(24, 18)));
        assert!(moves.contains(&Move::new(13, 8)));
        assert!(moves.contains(&Move::new(13, 7)));
        // Slot 19 holds five opposing checkers.
        assert!(!moves.contains(&Move::new(24, 19)));
        // 6/1 lands on two opposing checkers.
        assert!(!moves.contains(&Move::new(6, 1)));
        for mv in &moves {
            assert!(board.opposing(1, mv.to) <= 1, "{} lands on a closed point", mv);
        }

        let mut after = board.clone();
        apply_move(&mut after, 1, Move::new(24, 18));
        assert!(legal_moves(&after, 1, &[5]).contains(&Move::new(18, 13)));
    }

    #[test]
    fn test_moves_are_in_display_order() {
        let board = Board::new(Variant::Backgammon);
        let moves = legal_moves(&board, 1, &[3, 1]);
        let mut sorted = moves.clone();
        sort_moves(&mut sorted);
        assert_eq!(moves, sorted);
        assert_eq!(moves.first(), Some(&Move::new(24, 23)));
    }

    #[test]
    fn test_player_two_moves_upward() {
        let board = Board::new(Variant::Backgammon);
        let moves = legal_moves(&board, 2, &[6, 5]);
        assert!(moves.contains(&Move::new(1, 7)));
        assert!(moves.contains(&Move::new(12, 18)));
        assert!(!moves.contains(&Move::new(1, 6)));
    }

    #[test]
    fn test_bar_entry_only() {
        let mut board = Board::new(Variant::Backgammon);
        board.add(1, 24, -1);
        board.add(1, SPACE_BAR_PLAYER, 1);
        // Entry with 6 lands on 19, which player 2 holds.
        let moves = legal_moves(&board, 1, &[6, 5]);
        assert_eq!(moves, vec![Move::new(SPACE_BAR_PLAYER, 20)]);
    }

    #[test]
    fn test_closed_entry_means_no_moves() {
        let mut board = empty_board();
        board.add(1, SPACE_BAR_PLAYER, 1);
        board.add(1, 6, 14);
        for space in 19..=24 {
            board.add(2, space, 2);
        }
        board.add(2, SPACE_HOME_OPPONENT, 3);
        assert!(legal_moves(&board, 1, &[4, 2]).is_empty());
    }

    #[test]
    fn test_doubles_play_four_times() {
        let board = Board::new(Variant::Backgammon);
        let plays = legal_plays(&board, 1, &[4, 4, 4, 4]);
        assert!(plays.iter().all(|play| play.die == 4));
        let moves = legal_moves(&board, 1, &[4, 4, 4, 4]);
        assert!(moves.contains(&Move::new(24, 20)));
        assert!(moves.contains(&Move::new(13, 9)));
        assert!(moves.contains(&Move::new(6, 2)));
    }

    #[test]
    fn test_doubles_limited_by_checkers() {
        // A single checker left: doubles play as far as the checker can go.
        let mut board = empty_board();
        board.add(1, 0, 14);
        board.add(1, 20, 1);
        board.add(2, SPACE_HOME_OPPONENT, 15);
        let moves = legal_moves(&board, 1, &[5, 5, 5, 5]);
        assert_eq!(moves, vec![Move::new(20, 15)]);
        let mut after = board.clone();
        for (from, to) in [(20, 15), (15, 10), (10, 5), (5, 0)] {
            assert_eq!(legal_moves(&after, 1, &[5]), vec![Move::new(from, to)]);
            apply_move(&mut after, 1, Move::new(from, to));
        }
        assert!(has_won(&after, 1));
    }

    #[test]
    fn test_must_use_both_dice_when_possible() {
        let mut board = empty_board();
        board.add(1, 0, 14);
        board.add(1, 13, 1);
        board.add(2, 7, 2);
        board.add(2, 2, 2);
        board.add(2, SPACE_HOME_OPPONENT, 11);
        // 13/7 is blocked and 13/8/2 is blocked: only the five plays.
        assert_eq!(legal_moves(&board, 1, &[6, 5]), vec![Move::new(13, 8)]);
    }

    #[test]
    fn test_higher_die_when_only_one_playable() {
        let mut board = empty_board();
        board.add(1, 0, 14);
        board.add(1, 13, 1);
        board.add(2, 2, 2);
        board.add(2, SPACE_HOME_OPPONENT, 13);
        // Either die works alone but never both, so the six must be played.
        assert_eq!(legal_moves(&board, 1, &[6, 5]), vec![Move::new(13, 7)]);
    }

    #[test]
    fn test_bear_off_requires_all_home() {
        let mut board = empty_board();
        board.add(1, 6, 5);
        board.add(1, 5, 5);
        board.add(1, 4, 5);
        board.add(2, SPACE_HOME_OPPONENT, 15);
        assert!(may_bear_off(&board, 1));
        assert!(legal_moves(&board, 1, &[6, 1]).contains(&Move::new(6, 0)));

        board.add(1, 6, -1);
        board.add(1, 10, 1);
        assert!(!may_bear_off(&board, 1));
        assert!(!legal_moves(&board, 1, &[6, 1]).contains(&Move::new(6, 0)));
    }

    #[test]
    fn test_bear_off_rechecked_after_each_move() {
        let mut board = empty_board();
        board.add(1, 6, 14);
        board.add(1, 10, 1);
        board.add(2, SPACE_HOME_OPPONENT, 15);
        // 10/6 brings the straggler home, which then allows 6/off.
        let moves = legal_moves(&board, 1, &[4, 6]);
        assert!(moves.contains(&Move::new(10, 6)));
        assert!(!moves.contains(&Move::new(6, 0)));
        let mut after = board.clone();
        apply_move(&mut after, 1, Move::new(10, 6));
        assert_eq!(legal_moves(&after, 1, &[6]), vec![Move::new(6, 0)]);
    }

    #[test]
    fn test_bear_off_with_larger_die_from_highest_point() {
        let mut board = empty_board();
        board.add(1, 0, 13);
        board.add(1, 3, 1);
        board.add(1, 2, 1);
        board.add(2, SPACE_HOME_OPPONENT, 15);
        assert_eq!(legal_moves(&board, 1, &[6, 5]), vec![Move::new(3, 0)]);
    }

    #[test]
    fn test_player_two_bears_off_to_own_home() {
        let mut board = empty_board();
        board.add(2, 24, 2);
        board.add(2, SPACE_HOME_OPPONENT, 13);
        board.add(1, 0, 15);
        let moves = legal_moves(&board, 2, &[1, 1, 1, 1]);
        assert_eq!(moves, vec![Move::new(24, SPACE_HOME_OPPONENT)]);
    }

    #[test]
    fn test_hit_and_undo() {
        let mut board = empty_board();
        board.add(1, 10, 2);
        board.add(2, 7, 1);
        let before = board.clone();
        let applied = apply_move(&mut board, 1, Move::new(10, 7));
        assert!(applied.hit);
        assert_eq!(board.count(2, 27), 1);
        assert_eq!(board.count(1, 7), 1);
        assert!(undo_move(&mut board, 1, &applied));
        assert_eq!(board, before);
    }

    #[test]
    fn test_undo_rejects_impossible_position() {
        let mut board = empty_board();
        board.add(1, 10, 1);
        let applied = AppliedMove {
            mv: Move::new(12, 10),
            hit: true,
            entered: false,
        };
        let before = board.clone();
        assert!(!undo_move(&mut board, 1, &applied));
        assert_eq!(board, before);
    }

    #[test]
    fn test_expand_multi_die_move() {
        let board = Board::new(Variant::Backgammon);
        let chain = expand_move(&board, 1, &[6, 5], Move::new(24, 13)).unwrap();
        assert_eq!(
            chain.iter().map(|play| play.mv).collect::<Vec<_>>(),
            vec![Move::new(24, 18), Move::new(18, 13)]
        );
        assert!(expand_move(&board, 1, &[6, 5], Move::new(24, 12)).is_none());
        assert!(expand_move(&board, 1, &[6, 5], Move::new(6, 1)).is_none());
    }

    #[test]
    fn test_acey_deucey_entry_from_home() {
        let board = Board::new(Variant::AceyDeucey);
        let moves = legal_moves(&board, 1, &[3, 4]);
        assert!(moves.contains(&Move::new(0, 22)));
        assert!(moves.contains(&Move::new(0, 21)));
        let moves = legal_moves(&board, 2, &[3, 4]);
        assert!(moves.contains(&Move::new(SPACE_HOME_OPPONENT, 3)));
        assert!(!may_bear_off(&board, 1));
    }

    #[test]
    fn test_acey_deucey_entered_flag() {
        let mut board = Board::new(Variant::AceyDeucey);
        board.add(1, 0, -14);
        board.add(1, 5, 14);
        let applied = apply_move(&mut board, 1, Move::new(0, 22));
        assert!(applied.entered);
        assert!(board.has_entered(1));
        assert!(undo_move(&mut board, 1, &applied));
        assert!(!board.has_entered(1));
        assert_eq!(board.waiting(1), 1);
    }

    #[test]
    fn test_win_classification() {
        let mut board = empty_board();
        board.add(1, 0, 15);
        board.add(2, SPACE_HOME_OPPONENT, 1);
        board.add(2, 20, 14);
        assert_eq!(classify_win(&board, 1), WinKind::Single);

        let mut board = empty_board();
        board.add(1, 0, 15);
        board.add(2, 20, 15);
        assert_eq!(classify_win(&board, 1), WinKind::Gammon);

        let mut board = empty_board();
        board.add(1, 0, 15);
        board.add(2, 20, 14);
        board.add(2, 3, 1);
        assert_eq!(classify_win(&board, 1), WinKind::Backgammon);

        let mut board = empty_board();
        board.add(2, SPACE_HOME_OPPONENT, 15);
        board.add(1, 27 - 1, 1);
        board.add(1, 5, 14);
        assert_eq!(classify_win(&board, 2), WinKind::Backgammon);
        assert_eq!(WinKind::Backgammon.multiplier(), 3);
    }

    #[test]
    fn test_acey_deucey_classification() {
        let mut board = Board::new(Variant::AceyDeucey);
        board.add(1, 0, -15);
        board.add(1, 0, 15);
        board.set_entered(1, true);
        assert_eq!(classify_win(&board, 1), WinKind::Backgammon);

        board.add(2, SPACE_HOME_OPPONENT, -15);
        board.add(2, 20, 15);
        board.set_entered(2, true);
        assert_eq!(classify_win(&board, 1), WinKind::Gammon);
    }

    #[test]
    fn test_random_play_conserves_checkers() {
        let mut dice = RandomDice::seeded(42);
        for variant in [Variant::Backgammon, Variant::AceyDeucey, Variant::Tabula] {
            let mut board = Board::new(variant);
            let mut player = 1;
            for _ in 0..200 {
                let (a, b) = (dice.roll_die(), dice.roll_die());
                let mut remaining = if a == b && variant.doubles_played_twice() {
                    vec![a; 4]
                } else {
                    vec![a, b]
                };
                while let Some(play) = legal_plays(&board, player, &remaining).first().copied() {
                    apply_move(&mut board, player, play.mv);
                    let index = remaining.iter().position(|d| *d == play.die).unwrap();
                    remaining.remove(index);
                    assert_eq!(board.checkers(1), CHECKERS_PER_PLAYER);
                    assert_eq!(board.checkers(2), CHECKERS_PER_PLAYER);
                }
                if has_won(&board, player) {
                    break;
                }
                player = opponent(player);
            }
        }
    }
}
