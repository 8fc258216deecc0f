//! Seams to the services the match server relies on but does not own
//!
//! Accounts, password checks, rating computation and result storage live
//! outside the server. The dispatcher only needs an identity for each login
//! and somewhere to send finished matches, so those needs are expressed as the
//! [`AccountStore`] and [`ResultSink`] traits. [`MemoryAccounts`] and
//! [`LogResultSink`] are the in-process stand-ins the binary runs with.

use log::info;
use serde::Serialize;
use shared::Variant;
use std::collections::HashMap;

/// Who a connection is, as established at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Account number, `None` for guests.
    pub account: Option<u64>,
    pub name: String,
    /// The password was verified against a registered account.
    pub authenticated: bool,
}

impl Identity {
    pub fn guest(name: impl Into<String>) -> Self {
        Self {
            account: None,
            name: name.into(),
            authenticated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("the username {0} is already taken")]
    NameTaken(String),

    #[error("invalid username: {0}")]
    InvalidName(String),

    #[error("invalid email address")]
    InvalidEmail,
}

pub trait AccountStore: Send {
    fn authenticate(&mut self, name: &str, password: &str) -> Result<Identity, AccountError>;

    fn register(&mut self, email: &str, name: &str, password: &str)
        -> Result<Identity, AccountError>;

    /// Whether `name` belongs to a registered account.
    fn is_registered(&self, name: &str) -> bool;

    /// Rating of an account in the given variant's column.
    fn rating(&self, account: u64, variant: Variant) -> Option<i32>;
}

#[derive(Debug, Clone)]
struct Account {
    id: u64,
    name: String,
    email: String,
    password: String,
    ratings: [i32; 3],
}

/// Accounts held in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryAccounts {
    accounts: HashMap<String, Account>,
    next_account_id: u64,
}

impl MemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn email(&self, name: &str) -> Option<&str> {
        self.accounts
            .get(&name.to_ascii_lowercase())
            .map(|account| account.email.as_str())
    }
}

impl AccountStore for MemoryAccounts {
    fn authenticate(&mut self, name: &str, password: &str) -> Result<Identity, AccountError> {
        match self.accounts.get(&name.to_ascii_lowercase()) {
            Some(account) if account.password == password => Ok(Identity {
                account: Some(account.id),
                name: account.name.clone(),
                authenticated: true,
            }),
            _ => Err(AccountError::InvalidCredentials),
        }
    }

    fn register(
        &mut self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<Identity, AccountError> {
        if !crate::utils::valid_name(name) {
            return Err(AccountError::InvalidName(name.to_string()));
        }
        if !email.contains('@') {
            return Err(AccountError::InvalidEmail);
        }
        let key = name.to_ascii_lowercase();
        if self.accounts.contains_key(&key) {
            return Err(AccountError::NameTaken(name.to_string()));
        }

        self.next_account_id += 1;
        let account = Account {
            id: self.next_account_id,
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            ratings: [1500; 3],
        };
        info!("Registered account {} ({})", account.id, account.name);
        let identity = Identity {
            account: Some(account.id),
            name: account.name.clone(),
            authenticated: true,
        };
        self.accounts.insert(key, account);
        Ok(identity)
    }

    fn is_registered(&self, name: &str) -> bool {
        self.accounts.contains_key(&name.to_ascii_lowercase())
    }

    fn rating(&self, account: u64, variant: Variant) -> Option<i32> {
        self.accounts
            .values()
            .find(|a| a.id == account)
            .map(|a| a.ratings[variant.flag() as usize])
    }
}

/// A finished match, handed to the result sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub game_id: u32,
    pub variant: Variant,
    pub player1: String,
    pub player2: String,
    pub account1: Option<u64>,
    pub account2: Option<u64>,
    pub points: u32,
    pub score1: u32,
    pub score2: u32,
    pub winner: u8,
    pub started: u64,
    pub ended: u64,
    pub replay: Vec<String>,
}

/// Input for a rating update. Both sides update the same variant column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RatingOutcome {
    pub variant: Variant,
    pub winner: u64,
    pub loser: u64,
}

impl RatingOutcome {
    /// Only matches between two registered accounts are rated.
    pub fn from_result(result: &MatchResult) -> Option<Self> {
        let (winner, loser) = match result.winner {
            1 => (result.account1?, result.account2?),
            2 => (result.account2?, result.account1?),
            _ => return None,
        };
        Some(Self {
            variant: result.variant,
            winner,
            loser,
        })
    }
}

pub trait ResultSink: Send {
    fn record_match(&mut self, result: &MatchResult);

    fn record_rating(&mut self, outcome: &RatingOutcome);
}

/// Writes results to the log.
#[derive(Debug, Default)]
pub struct LogResultSink;

impl ResultSink for LogResultSink {
    fn record_match(&mut self, result: &MatchResult) {
        info!(
            "Match {} finished: {} {} - {} {} ({} points, {})",
            result.game_id,
            result.player1,
            result.score1,
            result.score2,
            result.player2,
            result.points,
            result.variant
        );
    }

    fn record_rating(&mut self, outcome: &RatingOutcome) {
        info!(
            "Rating update ({}): account {} beat account {}",
            outcome.variant, outcome.winner, outcome.loser
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_authenticate() {
        let mut accounts = MemoryAccounts::new();
        assert!(accounts.is_empty());
        let identity = accounts.register("a@example.com", "Alice", "pw").unwrap();
        assert_eq!(identity.name, "Alice");
        assert!(identity.authenticated);
        assert!(accounts.is_registered("alice"));
        assert_eq!(accounts.email("ALICE"), Some("a@example.com"));

        let login = accounts.authenticate("alice", "pw").unwrap();
        assert_eq!(login, identity);
        assert_eq!(
            accounts.authenticate("alice", "nope"),
            Err(AccountError::InvalidCredentials)
        );
        assert_eq!(
            accounts.authenticate("carol", "pw"),
            Err(AccountError::InvalidCredentials)
        );
    }

    #[test]
    fn test_register_rejects_duplicates_and_bad_input() {
        let mut accounts = MemoryAccounts::new();
        accounts.register("a@example.com", "alice", "pw").unwrap();
        assert_eq!(
            accounts.register("b@example.com", "ALICE", "pw"),
            Err(AccountError::NameTaken("ALICE".to_string()))
        );
        assert_eq!(
            accounts.register("nope", "bob", "pw"),
            Err(AccountError::InvalidEmail)
        );
        assert!(matches!(
            accounts.register("b@example.com", "Guest-1", "pw"),
            Err(AccountError::InvalidName(_))
        ));
        assert_eq!(accounts.len(), 1);
    }

    #[test]
    fn test_rating_column_by_variant() {
        let mut accounts = MemoryAccounts::new();
        let identity = accounts.register("a@example.com", "alice", "pw").unwrap();
        let id = identity.account.unwrap();
        assert_eq!(accounts.rating(id, Variant::Tabula), Some(1500));
        assert_eq!(accounts.rating(id + 1, Variant::Tabula), None);
    }

    fn result(winner: u8, account1: Option<u64>, account2: Option<u64>) -> MatchResult {
        MatchResult {
            game_id: 1,
            variant: Variant::Tabula,
            player1: "alice".to_string(),
            player2: "bob".to_string(),
            account1,
            account2,
            points: 1,
            score1: 0,
            score2: 1,
            winner,
            started: 0,
            ended: 0,
            replay: Vec::new(),
        }
    }

    #[test]
    fn test_rating_outcome_is_symmetric() {
        let outcome = RatingOutcome::from_result(&result(2, Some(7), Some(9))).unwrap();
        assert_eq!(outcome.winner, 9);
        assert_eq!(outcome.loser, 7);
        assert_eq!(outcome.variant, Variant::Tabula);

        let outcome = RatingOutcome::from_result(&result(1, Some(7), Some(9))).unwrap();
        assert_eq!((outcome.winner, outcome.loser), (7, 9));
        assert_eq!(outcome.variant, Variant::Tabula);

        assert!(RatingOutcome::from_result(&result(1, Some(7), None)).is_none());
    }
}
