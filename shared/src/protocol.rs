//! Wire protocol
//!
//! Every line a client sends is either a space-separated human command
//! (`move 24/18 13/8`) or a JSON object whose `"Type"` field names the
//! command (`{"Type":"move","moves":[{"from":24,"to":18}]}`). Both decode into
//! the same [`Command`]. Outbound traffic is the closed [`Event`] sum type,
//! rendered per connection as JSON or as human-readable text.

use crate::board::{Variant, SPACE_BAR_OPPONENT, SPACE_BAR_PLAYER, SPACE_HOME_OPPONENT, SPACE_HOME_PLAYER};
use crate::error::ParseError;
use crate::game::{GameView, Phase};
use crate::legality::WinKind;
use crate::moves::{format_moves, Move};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "lowercase")]
pub enum Command {
    Login {
        username: Option<String>,
        password: Option<String>,
        #[serde(default)]
        json: bool,
    },
    Register {
        email: String,
        username: String,
        password: String,
    },
    Json {
        enabled: bool,
    },
    Help {
        topic: Option<String>,
    },
    List,
    Say {
        message: String,
    },
    Ping {
        message: Option<String>,
    },
    Pong,
    Disconnect,
    Create {
        public: bool,
        password: Option<String>,
        points: u32,
        #[serde(default)]
        variant: Variant,
        name: Option<String>,
    },
    Join {
        target: String,
        password: Option<String>,
    },
    Leave,
    Roll,
    Move {
        moves: Vec<Move>,
    },
    Reset,
    Ok {
        doubles: Option<u8>,
    },
    Double,
    Resign,
    Rematch,
    Board,
    Replay {
        id: Option<u32>,
    },
}

impl Command {
    /// Decodes one inbound line in either protocol mode.
    pub fn parse_line(line: &str) -> Result<Command, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }
        if line.starts_with('{') {
            return serde_json::from_str(line).map_err(|e| ParseError::Json(e.to_string()));
        }
        parse_human(line)
    }

    /// Canonical keyword, as used in help and logs.
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::Login { json: true, .. } => "loginjson",
            Command::Login { .. } => "login",
            Command::Register { .. } => "register",
            Command::Json { .. } => "json",
            Command::Help { .. } => "help",
            Command::List => "list",
            Command::Say { .. } => "say",
            Command::Ping { .. } => "ping",
            Command::Pong => "pong",
            Command::Disconnect => "disconnect",
            Command::Create { .. } => "create",
            Command::Join { .. } => "join",
            Command::Leave => "leave",
            Command::Roll => "roll",
            Command::Move { .. } => "move",
            Command::Reset => "reset",
            Command::Ok { .. } => "ok",
            Command::Double => "double",
            Command::Resign => "resign",
            Command::Rematch => "rematch",
            Command::Board => "board",
            Command::Replay { .. } => "replay",
        }
    }
}

fn parse_flag(value: &str) -> Result<bool, ParseError> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" => Ok(false),
        _ => Err(ParseError::InvalidArgument(format!("expected on or off, got {}", value))),
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, ParseError> {
    value
        .parse()
        .map_err(|_| ParseError::InvalidArgument(format!("invalid {}: {}", what, value)))
}

fn rest_of(tokens: &[&str]) -> Option<String> {
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

fn parse_human(line: &str) -> Result<Command, ParseError> {
    let (keyword, remainder) = match line.split_once(char::is_whitespace) {
        Some((keyword, remainder)) => (keyword, remainder.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = remainder.split_whitespace().collect();
    let arg = |index: usize| args.get(index).map(|s| s.to_string());

    let command = match keyword.to_ascii_lowercase().as_str() {
        "login" | "lj" | "loginjson" => Command::Login {
            username: arg(0),
            password: rest_of(args.get(1..).unwrap_or_default()),
            json: keyword.eq_ignore_ascii_case("loginjson") || keyword.eq_ignore_ascii_case("lj"),
        },
        "register" => {
            let email = arg(0).ok_or(ParseError::MissingArgument("email"))?;
            let username = arg(1).ok_or(ParseError::MissingArgument("username"))?;
            let password = rest_of(args.get(2..).unwrap_or_default())
                .ok_or(ParseError::MissingArgument("password"))?;
            Command::Register {
                email,
                username,
                password,
            }
        }
        "json" => Command::Json {
            enabled: parse_flag(args.first().ok_or(ParseError::MissingArgument("on|off"))?)?,
        },
        "help" | "h" => Command::Help { topic: arg(0) },
        "list" | "ls" => Command::List,
        "say" | "s" => {
            if remainder.is_empty() {
                return Err(ParseError::MissingArgument("message"));
            }
            Command::Say {
                message: remainder.to_string(),
            }
        }
        "ping" => Command::Ping {
            message: if remainder.is_empty() {
                None
            } else {
                Some(remainder.to_string())
            },
        },
        "pong" => Command::Pong,
        "disconnect" | "quit" | "exit" => Command::Disconnect,
        "create" | "c" => parse_create(&args)?,
        "join" | "j" => Command::Join {
            target: arg(0).ok_or(ParseError::MissingArgument("id or username"))?,
            password: rest_of(args.get(1..).unwrap_or_default()),
        },
        "leave" | "l" => Command::Leave,
        "roll" | "r" => Command::Roll,
        "move" | "m" | "mv" => {
            if args.is_empty() {
                return Err(ParseError::MissingArgument("moves"));
            }
            let moves = args
                .iter()
                .map(|token| token.parse::<Move>())
                .collect::<Result<Vec<_>, _>>()?;
            Command::Move { moves }
        }
        "reset" => Command::Reset,
        "ok" | "k" => Command::Ok {
            doubles: args
                .first()
                .map(|value| parse_number(value, "doubles"))
                .transpose()?,
        },
        "double" | "d" => Command::Double,
        "resign" => Command::Resign,
        "rematch" | "rm" => Command::Rematch,
        "board" | "b" => Command::Board,
        "replay" => Command::Replay {
            id: args
                .first()
                .map(|value| parse_number(value, "match id"))
                .transpose()?,
        },
        _ => return Err(ParseError::UnknownCommand(keyword.to_string())),
    };
    Ok(command)
}

/// `create <public|private <password>> <points> [variant] [name]`
fn parse_create(args: &[&str]) -> Result<Command, ParseError> {
    let visibility = args.first().ok_or(ParseError::MissingArgument("public or private"))?;
    let (public, password, rest) = match visibility.to_ascii_lowercase().as_str() {
        "public" | "pub" => (true, None, &args[1..]),
        "private" | "priv" => {
            let password = args.get(1).ok_or(ParseError::MissingArgument("password"))?;
            (false, Some(password.to_string()), &args[2..])
        }
        other => {
            return Err(ParseError::InvalidArgument(format!(
                "expected public or private, got {}",
                other
            )))
        }
    };

    let points = rest.first().ok_or(ParseError::MissingArgument("points"))?;
    let points: u32 = parse_number(points, "points")?;
    if points == 0 {
        return Err(ParseError::InvalidArgument("points must be at least 1".to_string()));
    }

    let mut rest = &rest[1..];
    let mut variant = Variant::default();
    if let Some(parsed) = rest.first().and_then(|token| Variant::parse(token)) {
        variant = parsed;
        rest = &rest[1..];
    }

    Ok(Command::Create {
        public,
        password,
        points,
        variant,
        name: rest_of(rest),
    })
}

/// One row of the match list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameListing {
    pub id: u32,
    pub password: bool,
    pub points: u32,
    pub players: u8,
    pub variant: Variant,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "lowercase")]
pub enum Event {
    Welcome {
        player_name: String,
        clients: usize,
        games: usize,
        motd: Option<String>,
    },
    Help {
        topic: Option<String>,
        message: String,
    },
    Notice {
        message: String,
    },
    Say {
        player: String,
        message: String,
    },
    List {
        games: Vec<GameListing>,
    },
    Joined {
        game_id: u32,
        player_number: u8,
        player: String,
    },
    FailedJoin {
        reason: String,
    },
    Left {
        game_id: u32,
        player_number: u8,
        player: String,
    },
    FailedLeave {
        reason: String,
    },
    Board(GameView),
    Rolled {
        player: String,
        roll: Vec<u8>,
    },
    FailedRoll {
        reason: String,
    },
    Moved {
        player: String,
        moves: Vec<Move>,
    },
    FailedMove {
        reason: String,
    },
    FailedOk {
        reason: String,
    },
    FailedCreate {
        reason: String,
    },
    FailedLogin {
        reason: String,
    },
    Win {
        player: String,
        points: u32,
        kind: WinKind,
        resigned: bool,
        match_over: bool,
    },
    Replay {
        game_id: u32,
        lines: Vec<String>,
    },
    Ping {
        message: String,
    },
}

impl Event {
    pub fn notice(message: impl Into<String>) -> Self {
        Event::Notice {
            message: message.into(),
        }
    }

    /// Serialises the event for a connection in the given mode. Human output
    /// may span several lines.
    pub fn encode(&self, json: bool) -> Result<String, serde_json::Error> {
        if json {
            serde_json::to_string(self)
        } else {
            Ok(self.to_human())
        }
    }

    pub fn to_human(&self) -> String {
        match self {
            Event::Welcome {
                player_name,
                clients,
                games,
                motd,
            } => {
                let mut text = format!(
                    "welcome {} there are {} clients playing {} matches.",
                    player_name, clients, games
                );
                if let Some(motd) = motd {
                    text.push_str(&format!("\nnotice {}", motd));
                }
                text
            }
            Event::Help { message, .. } => message
                .lines()
                .map(|line| format!("help {}", line))
                .collect::<Vec<_>>()
                .join("\n"),
            Event::Notice { message } => format!("notice {}", message),
            Event::Say { player, message } => format!("say {} {}", player, message),
            Event::List { games } => {
                let mut lines = vec!["liststart".to_string()];
                for game in games {
                    lines.push(format!(
                        "game {} {} {} {} {} {}",
                        game.id,
                        u8::from(game.password),
                        game.points,
                        game.players,
                        game.variant,
                        game.name
                    ));
                }
                lines.push("listend".to_string());
                lines.join("\n")
            }
            Event::Joined {
                game_id,
                player_number,
                player,
            } => format!("joined {} {} {}", game_id, player_number, player),
            Event::Left {
                game_id,
                player_number,
                player,
            } => format!("left {} {} {}", game_id, player_number, player),
            Event::FailedJoin { reason } => format!("failedjoin {}", reason),
            Event::FailedLeave { reason } => format!("failedleave {}", reason),
            Event::FailedRoll { reason } => format!("failedroll {}", reason),
            Event::FailedMove { reason } => format!("failedmove {}", reason),
            Event::FailedOk { reason } => format!("failedok {}", reason),
            Event::FailedCreate { reason } => format!("failedcreate {}", reason),
            Event::FailedLogin { reason } => format!("failedlogin {}", reason),
            Event::Board(view) => render_board(view),
            Event::Rolled { player, roll } => {
                let dice: Vec<String> = roll.iter().map(|d| d.to_string()).collect();
                format!("rolled {} {}", player, dice.join(" "))
            }
            Event::Moved { player, moves } => format!("moved {} {}", player, format_moves(moves)),
            Event::Win {
                player,
                points,
                kind,
                resigned,
                match_over,
            } => {
                let mut text = format!("win {} wins {} point", player, points);
                if *points != 1 {
                    text.push('s');
                }
                match (resigned, kind) {
                    (true, _) => text.push_str(" by resignation"),
                    (false, WinKind::Gammon) => text.push_str(" with a gammon"),
                    (false, WinKind::Backgammon) => text.push_str(" with a backgammon"),
                    (false, WinKind::Single) => {}
                }
                if *match_over {
                    text.push_str(" and the match");
                }
                text
            }
            Event::Replay { game_id, lines } => {
                let mut text = format!("replay {}", game_id);
                for line in lines {
                    text.push('\n');
                    text.push_str(line);
                }
                text
            }
            Event::Ping { message } => format!("ping {}", message),
        }
    }
}

fn render_slot(value: i8) -> String {
    match value {
        0 => ".".to_string(),
        v if v > 0 => format!("{}x", v),
        v => format!("{}o", -v),
    }
}

fn render_row(board: &[i8], spaces: impl Iterator<Item = usize>) -> (String, String) {
    let mut labels = String::new();
    let mut values = String::new();
    for (column, space) in spaces.enumerate() {
        if column == 6 {
            labels.push_str(" |");
            values.push_str(" |");
        }
        labels.push_str(&format!("{:>4}", space));
        values.push_str(&format!("{:>4}", render_slot(board.get(space).copied().unwrap_or(0))));
    }
    (labels, values)
}

/// Text rendering of a board view. `x` marks the recipient's checkers.
pub fn render_board(view: &GameView) -> String {
    let board = &view.board;
    let slot = |space: i8| board.get(space as usize).copied().unwrap_or(0).unsigned_abs();
    let (top_labels, top_values) = render_row(board, 13..=24);
    let (bottom_labels, bottom_values) = render_row(board, (1..=12).rev());

    let mut lines = vec![format!(
        "board {} {} match to {}: {} (x) {} - {} (o) {}",
        view.game_id,
        view.variant,
        view.points,
        view.player.name,
        view.player.points,
        view.opponent.name,
        view.opponent.points
    )];
    lines.push(top_labels);
    lines.push(top_values);
    lines.push(bottom_values);
    lines.push(bottom_labels);
    lines.push(format!(
        "bar {}x {}o  off {}x {}o  pips {} {}",
        slot(SPACE_BAR_PLAYER),
        slot(SPACE_BAR_OPPONENT),
        slot(SPACE_HOME_PLAYER),
        slot(SPACE_HOME_OPPONENT),
        view.player.pips,
        view.opponent.pips
    ));

    let mut status = match view.phase {
        Phase::WaitingForPlayers => "waiting for an opponent".to_string(),
        Phase::RollToStart => "roll to decide who starts".to_string(),
        Phase::MatchOver => {
            let winner = if view.winner == 1 {
                &view.player.name
            } else {
                &view.opponent.name
            };
            format!("match over, {} wins", winner)
        }
        _ => {
            let holder = if view.turn == 1 {
                "your turn"
            } else {
                "opponent's turn"
            };
            let dice: Vec<String> = view
                .roll
                .iter()
                .filter(|d| **d != 0)
                .map(|d| d.to_string())
                .collect();
            if dice.is_empty() {
                holder.to_string()
            } else {
                format!("{}, rolled {}", holder, dice.join("-"))
            }
        }
    };
    status.push_str(&format!(", cube {}", view.double_value));
    if view.double_offered {
        status.push_str(", double offered");
    }
    if view.choose_doubles {
        status.push_str(", choose doubles with ok <1-6>");
    }
    lines.push(status);
    if !view.available.is_empty() {
        lines.push(format!("moves {}", format_moves(&view.available)));
    }
    lines.join("\n")
}

/// Usage lines for `help`.
const USAGE: &[(&str, &str)] = &[
    ("login", "login [username] [password] - log in, or play as a guest"),
    ("loginjson", "loginjson [username] [password] - log in and switch to JSON"),
    ("register", "register <email> <username> <password> - create an account"),
    ("json", "json <on|off> - toggle JSON messages"),
    ("help", "help [command] - show help"),
    ("list", "list - list matches"),
    ("say", "say <message> - chat with your opponent and spectators"),
    ("create", "create <public|private <password>> <points> [variant] [name] - create a match"),
    ("join", "join <id|username> [password] - join a match"),
    ("leave", "leave - leave the match"),
    ("roll", "roll - roll the dice"),
    ("move", "move <from>/<to> [<from>/<to>]... - move checkers (bar and off accepted)"),
    ("reset", "reset - undo this turn's moves"),
    ("ok", "ok [1-6] - end your turn, accept a double or choose bonus doubles"),
    ("double", "double - offer a double"),
    ("resign", "resign - resign the game or decline a double"),
    ("rematch", "rematch - start a new match against the same opponent"),
    ("board", "board - show the board"),
    ("replay", "replay [id] - show a match replay"),
    ("disconnect", "disconnect - close the connection"),
];

pub fn help_text(topic: Option<&str>) -> String {
    match topic {
        Some(topic) => USAGE
            .iter()
            .find(|(keyword, _)| keyword.eq_ignore_ascii_case(topic))
            .map(|(_, usage)| usage.to_string())
            .unwrap_or_else(|| format!("unknown command: {}", topic)),
        None => USAGE
            .iter()
            .map(|(_, usage)| *usage)
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
