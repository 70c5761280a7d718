use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Match formats and their per-team class layout.
///
/// Slots are numbered red first: slot `i` for `i < team_size` is red, the rest
/// are blu with the same class order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchType {
    Sixes,
    Highlander,
    Fours,
    Ultiduo,
    Bball,
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    Red,
    Blu,
}

const SIXES: &[&str] = &["scout1", "scout2", "roamer", "pocket", "demoman", "medic"];
const HIGHLANDER: &[&str] = &["scout", "soldier", "pyro", "demoman", "heavy", "engineer", "medic", "sniper", "spy"];
const FOURS: &[&str] = &["scout", "soldier", "demoman", "medic"];
const ULTIDUO: &[&str] = &["soldier", "medic"];
const BBALL: &[&str] = &["soldier1", "soldier2"];
const DEBUG: &[&str] = &["scout"];

impl MatchType {
    pub fn classes(&self) -> &'static [&'static str] {
        match self {
            MatchType::Sixes => SIXES,
            MatchType::Highlander => HIGHLANDER,
            MatchType::Fours => FOURS,
            MatchType::Ultiduo => ULTIDUO,
            MatchType::Bball => BBALL,
            MatchType::Debug => DEBUG,
        }
    }

    pub fn team_size(&self) -> u8 {
        self.classes().len() as u8
    }

    pub fn slot_count(&self) -> u8 {
        self.team_size() * 2
    }

    /// Team and class occupying `slot`, or `None` if the format has no such slot.
    pub fn slot_info(&self, slot: u8) -> Option<(Team, &'static str)> {
        let size = self.team_size();
        if slot >= self.slot_count() {
            return None;
        }
        let (team, index) = if slot < size { (Team::Red, slot) } else { (Team::Blu, slot - size) };
        Some((team, self.classes()[index as usize]))
    }

    pub fn slot_for(&self, team: Team, class: &str) -> Result<u8, Error> {
        let class = class.to_ascii_lowercase();
        let index = self
            .classes()
            .iter()
            .position(|c| *c == class)
            .ok_or_else(|| Error::Config(format!("class '{}' does not exist in {} matches", class, self)))?;
        let offset = match team {
            Team::Red => 0,
            Team::Blu => self.team_size(),
        };
        Ok(offset + index as u8)
    }
}

impl FromStr for MatchType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "sixes" | "6s" => Ok(MatchType::Sixes),
            "highlander" | "hl" => Ok(MatchType::Highlander),
            "fours" | "4v4" => Ok(MatchType::Fours),
            "ultiduo" => Ok(MatchType::Ultiduo),
            "bball" => Ok(MatchType::Bball),
            "debug" => Ok(MatchType::Debug),
            other => Err(Error::Config(format!("unknown match type '{}'", other))),
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchType::Sixes => "sixes",
            MatchType::Highlander => "highlander",
            MatchType::Fours => "fours",
            MatchType::Ultiduo => "ultiduo",
            MatchType::Bball => "bball",
            MatchType::Debug => "debug",
        };
        f.write_str(name)
    }
}

impl FromStr for Team {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "red" => Ok(Team::Red),
            "blu" | "blue" => Ok(Team::Blu),
            other => Err(Error::Config(format!("unknown team '{}'", other))),
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Team::Red => "red",
            Team::Blu => "blu",
        })
    }
}
