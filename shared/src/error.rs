/// Reasons a game action is rejected. The `Display` text is what the
/// requesting client sees.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("the match has not started yet")]
    NotStarted,

    #[error("the match is over")]
    MatchOver,

    #[error("it is not your turn")]
    NotYourTurn,

    #[error("you have already rolled")]
    AlreadyRolled,

    #[error("you must roll first")]
    NotRolled,

    #[error("waiting for a response to the double offer")]
    DoublePending,

    #[error("you cannot offer a double now: {0}")]
    CannotDouble(&'static str),

    #[error("illegal move: {0}")]
    IllegalMove(String),

    #[error("you must play every legal move before ending your turn")]
    MovesRemaining,

    #[error("choose the doubles you want to play (1-6)")]
    ChooseDoubles,

    #[error("there are no moves to undo")]
    NothingToReset,

    #[error("you can only resign during your turn")]
    CannotResign,

    /// Internal state is inconsistent; the process must not continue.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Protocol-level rejection of a command line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("malformed JSON command: {0}")]
    Json(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_error_display() {
        assert_eq!(GameError::NotYourTurn.to_string(), "it is not your turn");
        assert_eq!(
            GameError::CannotDouble("you do not hold the cube").to_string(),
            "you cannot offer a double now: you do not hold the cube"
        );
        assert_eq!(
            GameError::IllegalMove("13/2".to_string()).to_string(),
            "illegal move: 13/2"
        );
    }

    #[test]
    fn test_parse_error_display() {
        assert_eq!(
            ParseError::UnknownCommand("fly".to_string()).to_string(),
            "unknown command: fly"
        );
        assert_eq!(
            ParseError::MissingArgument("points").to_string(),
            "missing argument: points"
        );
    }
}
