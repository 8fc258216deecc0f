use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Current Unix time in seconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}

// Random name for a client that logs in without one
pub fn guest_name<R: Rng>(rng: &mut R) -> String {
    format!("Guest-{:04}", rng.gen_range(0..10_000))
}

/// Whether a chosen display name is acceptable.
pub fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 24
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !name.to_ascii_lowercase().starts_with("guest-")
        && name.parse::<u32>().is_err()
}
