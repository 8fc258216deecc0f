//! Moves and move notation
//!
//! A move is a `(from, to)` pair. Text notation is `from/to` with `bar` and
//! `off` accepted for the mover's bar (26) and home (0).

use crate::board::{flip_space, SPACE_BAR_PLAYER, SPACE_HOME_PLAYER};
use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawMove")]
pub struct Move {
    pub from: i8,
    pub to: i8,
}

/// A move as it arrives in JSON, before its spaces are checked.
#[derive(Deserialize)]
struct RawMove {
    from: i8,
    to: i8,
}

impl TryFrom<RawMove> for Move {
    type Error = ParseError;

    fn try_from(raw: RawMove) -> Result<Self, Self::Error> {
        let mv = Move::new(raw.from, raw.to);
        if mv.in_range() {
            Ok(mv)
        } else {
            Err(ParseError::InvalidArgument(format!(
                "invalid move: {}/{}",
                raw.from, raw.to
            )))
        }
    }
}

impl Move {
    pub fn new(from: i8, to: i8) -> Self {
        Move { from, to }
    }

    /// Both spaces lie on the board, bars and homes included.
    pub fn in_range(self) -> bool {
        is_space(self.from) && is_space(self.to)
    }

    /// The same move expressed in (or from) `player`'s frame.
    pub fn flipped(self, player: u8) -> Self {
        Move {
            from: flip_space(self.from, player),
            to: flip_space(self.to, player),
        }
    }

    /// The move that undoes this one.
    pub fn inverse(self) -> Self {
        Move {
            from: self.to,
            to: self.from,
        }
    }
}

/// Display order: `from` descending, then `to` descending.
pub fn display_order(a: &Move, b: &Move) -> Ordering {
    b.from.cmp(&a.from).then(b.to.cmp(&a.to))
}

/// Sorts into display order and drops duplicates.
pub fn sort_moves(moves: &mut Vec<Move>) {
    moves.sort_by(display_order);
    moves.dedup();
}

fn is_space(space: i8) -> bool {
    (0..=27).contains(&space)
}

fn format_space(space: i8) -> String {
    match space {
        SPACE_HOME_PLAYER => "off".to_string(),
        SPACE_BAR_PLAYER => "bar".to_string(),
        other => other.to_string(),
    }
}

fn parse_space(token: &str) -> Result<i8, ParseError> {
    match token.to_ascii_lowercase().as_str() {
        "off" | "home" => Ok(SPACE_HOME_PLAYER),
        "bar" => Ok(SPACE_BAR_PLAYER),
        number => match number.parse::<i8>() {
            Ok(space) if is_space(space) => Ok(space),
            _ => Err(ParseError::InvalidArgument(format!("invalid space: {}", token))),
        },
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", format_space(self.from), format_space(self.to))
    }
}

impl FromStr for Move {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, to) = s
            .split_once('/')
            .or_else(|| s.split_once('-'))
            .ok_or_else(|| ParseError::InvalidArgument(format!("invalid move: {}", s)))?;
        Ok(Move::new(parse_space(from)?, parse_space(to)?))
    }
}

/// Space-separated notation of a move list.
pub fn format_moves(moves: &[Move]) -> String {
    moves
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_notation() {
        assert_eq!("24/18".parse::<Move>().unwrap(), Move::new(24, 18));
        assert_eq!("bar/22".parse::<Move>().unwrap(), Move::new(26, 22));
        assert_eq!("6/off".parse::<Move>().unwrap(), Move::new(6, 0));
        assert_eq!("13-7".parse::<Move>().unwrap(), Move::new(13, 7));
        assert!("24".parse::<Move>().is_err());
        assert!("30/2".parse::<Move>().is_err());
        assert!("x/2".parse::<Move>().is_err());
    }

    #[test]
    fn test_display_uses_names() {
        assert_eq!(Move::new(26, 20).to_string(), "bar/20");
        assert_eq!(Move::new(3, 0).to_string(), "3/off");
        assert_eq!(format_moves(&[Move::new(13, 7), Move::new(8, 7)]), "13/7 8/7");
    }

    #[test]
    fn test_sort_order_and_dedup() {
        let mut moves = vec![
            Move::new(8, 2),
            Move::new(13, 7),
            Move::new(24, 18),
            Move::new(13, 8),
            Move::new(13, 7),
        ];
        sort_moves(&mut moves);
        assert_eq!(
            moves,
            vec![
                Move::new(24, 18),
                Move::new(13, 8),
                Move::new(13, 7),
                Move::new(8, 2),
            ]
        );
    }

    #[test]
    fn test_flip_and_inverse() {
        let m = Move::new(24, 18);
        assert_eq!(m.flipped(2), Move::new(1, 7));
        assert_eq!(m.flipped(2).flipped(2), m);
        assert_eq!(m.flipped(1), m);
        assert_eq!(m.inverse(), Move::new(18, 24));
        assert_eq!(Move::new(26, 22).flipped(2), Move::new(27, 3));
    }

    #[test]
    fn test_json_rejects_spaces_off_the_board() {
        let mv: Move = serde_json::from_str(r#"{"from":24,"to":18}"#).unwrap();
        assert_eq!(mv, Move::new(24, 18));
        assert!(serde_json::from_str::<Move>(r#"{"from":24,"to":-128}"#).is_err());
        assert!(serde_json::from_str::<Move>(r#"{"from":-110,"to":5}"#).is_err());
        assert!(serde_json::from_str::<Move>(r#"{"from":28,"to":5}"#).is_err());
        assert!(!Move::new(24, -1).in_range());
    }
}
