use bimap::BiMap;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use crate::domain::match_format::MatchType;
use crate::domain::utils::id::{MatchId, SteamId};
use crate::error::{Error, Result};

/// Player and match records the facade answers from.
///
/// Reads always see the current state; nothing is cached on the query side.
pub trait MatchDirectory: Send + Sync {
    fn register_match(&self, match_id: &MatchId, match_type: MatchType);

    /// Puts `steam_id` into `slot`, registering the player on first sight and
    /// moving them if they already held another slot in the match.
    fn assign_slot(&self, match_id: &MatchId, steam_id: &SteamId, name: &str, slot: u8) -> Result<()>;

    fn set_allowed(&self, match_id: &MatchId, steam_id: &SteamId, allowed: bool) -> Result<()>;

    fn remove_match(&self, match_id: &MatchId);

    fn player_id(&self, steam_id: &SteamId) -> Option<u64>;

    fn player_name(&self, steam_id: &SteamId) -> Option<String>;

    fn match_type(&self, match_id: &MatchId) -> Option<MatchType>;

    fn slot_of(&self, match_id: &MatchId, steam_id: &SteamId) -> Option<u8>;

    fn occupant(&self, match_id: &MatchId, slot: u8) -> Option<SteamId>;

    fn is_allowed(&self, match_id: &MatchId, steam_id: &SteamId) -> bool;
}

#[derive(Debug, Clone)]
struct PlayerRecord {
    id: u64,
    name: String,
}

#[derive(Debug, Clone)]
struct MatchEntry {
    match_type: MatchType,
    slots: BiMap<u8, SteamId>,
    allowed: HashSet<SteamId>,
}

#[derive(Debug, Default)]
struct DirectoryInner {
    players: HashMap<SteamId, PlayerRecord>,
    next_player_id: u64,
    matches: HashMap<MatchId, MatchEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryMatchDirectory {
    inner: Arc<RwLock<DirectoryInner>>,
}

impl InMemoryMatchDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchDirectory for InMemoryMatchDirectory {
    //----------------------
    // --- Write Methods ---
    //----------------------
    fn register_match(&self, match_id: &MatchId, match_type: MatchType) {
        let mut guard = self.inner.write().expect("RwLock poisoned");
        guard.matches.insert(match_id.clone(), MatchEntry { match_type, slots: BiMap::new(), allowed: HashSet::new() });
    }

    fn assign_slot(&self, match_id: &MatchId, steam_id: &SteamId, name: &str, slot: u8) -> Result<()> {
        let mut guard = self.inner.write().expect("RwLock poisoned");
        let inner = &mut *guard;

        let entry = inner.matches.get_mut(match_id).ok_or_else(|| Error::Directory(format!("match {} is not registered", match_id)))?;
        if entry.match_type.slot_info(slot).is_none() {
            return Err(Error::Directory(format!("slot {} does not exist in {} matches", slot, entry.match_type)));
        }
        if let Some(current) = entry.slots.get_by_left(&slot) {
            if current != steam_id {
                return Err(Error::Directory(format!("slot {} of match {} is already taken by {}", slot, match_id, current)));
            }
        }
        entry.slots.insert(slot, steam_id.clone());

        if !inner.players.contains_key(steam_id) {
            inner.next_player_id += 1;
            let id = inner.next_player_id;
            inner.players.insert(steam_id.clone(), PlayerRecord { id, name: name.to_string() });
        } else if !name.is_empty() {
            if let Some(record) = inner.players.get_mut(steam_id) {
                record.name = name.to_string();
            }
        }
        Ok(())
    }

    fn set_allowed(&self, match_id: &MatchId, steam_id: &SteamId, allowed: bool) -> Result<()> {
        let mut guard = self.inner.write().expect("RwLock poisoned");
        let entry = guard.matches.get_mut(match_id).ok_or_else(|| Error::Directory(format!("match {} is not registered", match_id)))?;
        if allowed {
            entry.allowed.insert(steam_id.clone());
        } else {
            entry.allowed.remove(steam_id);
        }
        Ok(())
    }

    fn remove_match(&self, match_id: &MatchId) {
        let mut guard = self.inner.write().expect("RwLock poisoned");
        guard.matches.remove(match_id);
    }

    //---------------------
    // --- Read Methods ---
    //---------------------
    fn player_id(&self, steam_id: &SteamId) -> Option<u64> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.players.get(steam_id).map(|record| record.id)
    }

    fn player_name(&self, steam_id: &SteamId) -> Option<String> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.players.get(steam_id).map(|record| record.name.clone())
    }

    fn match_type(&self, match_id: &MatchId) -> Option<MatchType> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.matches.get(match_id).map(|entry| entry.match_type)
    }

    fn slot_of(&self, match_id: &MatchId, steam_id: &SteamId) -> Option<u8> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.matches.get(match_id).and_then(|entry| entry.slots.get_by_right(steam_id).copied())
    }

    fn occupant(&self, match_id: &MatchId, slot: u8) -> Option<SteamId> {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.matches.get(match_id).and_then(|entry| entry.slots.get_by_left(&slot).cloned())
    }

    fn is_allowed(&self, match_id: &MatchId, steam_id: &SteamId) -> bool {
        let guard = self.inner.read().expect("RwLock poisoned");
        guard.matches.get(match_id).is_some_and(|entry| entry.allowed.contains(steam_id))
    }
}
