//! Registry of open matches
//!
//! Matches are keyed by a monotonically increasing id and kept in id order so
//! listings come out stable.

use crate::coordinator::ServerMatch;
use log::info;
use shared::{GameListing, Variant};
use std::collections::BTreeMap;

pub struct MatchManager {
    matches: BTreeMap<u32, ServerMatch>,
    next_match_id: u32,
}

impl MatchManager {
    pub fn new() -> Self {
        Self {
            matches: BTreeMap::new(),
            next_match_id: 1,
        }
    }

    /// Opens a new, empty match and returns its id.
    pub fn create(
        &mut self,
        name: String,
        password: Option<String>,
        variant: Variant,
        points: u32,
        now: u64,
    ) -> u32 {
        let id = self.next_match_id;
        self.next_match_id += 1;
        info!("Created match {} ({}, {} points): {}", id, variant, points, name);
        self.matches
            .insert(id, ServerMatch::new(id, name, password, variant, points, now));
        id
    }

    pub fn get(&self, id: u32) -> Option<&ServerMatch> {
        self.matches.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut ServerMatch> {
        self.matches.get_mut(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<ServerMatch> {
        self.matches.remove(&id)
    }

    /// Match a player of the given name is currently seated in.
    pub fn find_by_player_name(&self, name: &str) -> Option<u32> {
        self.matches
            .values()
            .find(|m| {
                m.seat_for_name(name)
                    .map(|number| m.seats[number as usize - 1].is_some())
                    .unwrap_or(false)
            })
            .map(|m| m.id)
    }

    /// Unfinished match holding a vacant seat reserved for `name`.
    pub fn find_rejoin(&self, name: &str) -> Option<u32> {
        self.matches
            .values()
            .find(|m| m.can_rejoin(name))
            .map(|m| m.id)
    }

    pub fn listings(&self) -> Vec<GameListing> {
        self.matches.values().map(ServerMatch::listing).collect()
    }

    /// Removes matches nobody is playing or watching.
    pub fn sweep(&mut self) -> Vec<u32> {
        let abandoned: Vec<u32> = self
            .matches
            .values()
            .filter(|m| m.is_abandoned())
            .map(|m| m.id)
            .collect();
        for id in &abandoned {
            self.matches.remove(id);
            info!("Removed abandoned match {}", id);
        }
        abandoned
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

impl Default for MatchManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_match() -> (MatchManager, u32) {
        let mut manager = MatchManager::new();
        let id = manager.create("test".to_string(), None, Variant::Backgammon, 1, 0);
        (manager, id)
    }

    #[test]
    fn test_ids_increase() {
        let mut manager = MatchManager::new();
        let first = manager.create("a".to_string(), None, Variant::Backgammon, 1, 0);
        let second = manager.create("b".to_string(), None, Variant::Tabula, 3, 0);
        assert_eq!((first, second), (1, 2));
        manager.remove(first);
        let third = manager.create("c".to_string(), None, Variant::AceyDeucey, 1, 0);
        assert_eq!(third, 3);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_listings_in_id_order() {
        let mut manager = MatchManager::new();
        manager.create("one".to_string(), Some("pw".to_string()), Variant::Backgammon, 5, 0);
        manager.create("two".to_string(), None, Variant::Tabula, 1, 0);
        let listings = manager.listings();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].name, "one");
        assert!(listings[0].password);
        assert_eq!(listings[0].points, 5);
        assert_eq!(listings[1].variant, Variant::Tabula);
        assert_eq!(listings[1].players, 0);
    }

    #[test]
    fn test_find_rejoin_and_player() {
        let (mut manager, id) = manager_with_match();
        let game = manager.get_mut(id).unwrap();
        game.game.player1.name = "alice".to_string();
        game.game.player2.name = "bob".to_string();
        game.seats = [None, Some(9)];

        assert_eq!(manager.find_rejoin("Alice"), Some(id));
        assert_eq!(manager.find_rejoin("bob"), None);
        assert_eq!(manager.find_by_player_name("bob"), Some(id));
        assert_eq!(manager.find_by_player_name("alice"), None);
        assert_eq!(manager.find_rejoin("carol"), None);
    }

    #[test]
    fn test_sweep_removes_abandoned() {
        let (mut manager, id) = manager_with_match();
        let busy = manager.create("busy".to_string(), None, Variant::Backgammon, 1, 0);
        manager.get_mut(busy).unwrap().spectators.push(4);

        assert_eq!(manager.sweep(), vec![id]);
        assert!(manager.get(id).is_none());
        assert!(manager.get(busy).is_some());
        assert!(manager.sweep().is_empty());
    }
}
