use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::domain::facade::match_directory::MatchDirectory;
use crate::domain::match_format::Team;
use crate::domain::rpc::envelope::Outcome;
use crate::domain::utils::id::{MatchId, SteamId};

/// Queries the control service may send us.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum FacadeRequest {
    GetPlayerId { steam_id: SteamId },
    GetTeam { match_id: MatchId, steam_id: SteamId },
    GetSteamIdFromSlot { match_id: MatchId, team: Team, class: String },
    GetNameFromSteamId { steam_id: SteamId },
    IsAllowed { match_id: MatchId, steam_id: SteamId },
}

impl FacadeRequest {
    pub fn method(&self) -> &'static str {
        match self {
            FacadeRequest::GetPlayerId { .. } => "Helen.GetPlayerID",
            FacadeRequest::GetTeam { .. } => "Helen.GetTeam",
            FacadeRequest::GetSteamIdFromSlot { .. } => "Helen.GetSteamIDFromSlot",
            FacadeRequest::GetNameFromSteamId { .. } => "Helen.GetNameFromSteamID",
            FacadeRequest::IsAllowed { .. } => "Helen.IsAllowed",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum FacadeReply {
    PlayerId(u64),
    Team(Team),
    SteamId(SteamId),
    Name(String),
    Allowed(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FacadeError {
    #[error("no player with steam id {0}")]
    UnknownPlayer(SteamId),

    #[error("match {0} does not exist")]
    UnknownMatch(MatchId),

    #[error("player {steam_id} is not in match {match_id}")]
    NotInMatch { match_id: MatchId, steam_id: SteamId },

    #[error("{team} {class} in match {match_id} is empty")]
    EmptySlot { match_id: MatchId, team: Team, class: String },

    #[error("{0}")]
    InvalidSlot(String),
}

/// Read-only identity and slot lookups answered from the match directory.
#[derive(Clone)]
pub struct ProvisioningFacade {
    directory: Arc<dyn MatchDirectory>,
}

impl ProvisioningFacade {
    pub fn new(directory: Arc<dyn MatchDirectory>) -> Self {
        Self { directory }
    }

    pub fn get_player_id(&self, steam_id: &SteamId) -> Result<u64, FacadeError> {
        self.directory.player_id(steam_id).ok_or_else(|| FacadeError::UnknownPlayer(steam_id.clone()))
    }

    pub fn get_team(&self, match_id: &MatchId, steam_id: &SteamId) -> Result<Team, FacadeError> {
        let match_type = self.directory.match_type(match_id).ok_or_else(|| FacadeError::UnknownMatch(match_id.clone()))?;
        let slot = self
            .directory
            .slot_of(match_id, steam_id)
            .ok_or_else(|| FacadeError::NotInMatch { match_id: match_id.clone(), steam_id: steam_id.clone() })?;
        let (team, _) = match_type.slot_info(slot).ok_or_else(|| FacadeError::InvalidSlot(format!("slot {} is outside {}", slot, match_type)))?;
        Ok(team)
    }

    pub fn get_steam_id_from_slot(&self, match_id: &MatchId, team: Team, class: &str) -> Result<SteamId, FacadeError> {
        let match_type = self.directory.match_type(match_id).ok_or_else(|| FacadeError::UnknownMatch(match_id.clone()))?;
        let slot = match_type.slot_for(team, class).map_err(|e| FacadeError::InvalidSlot(e.to_string()))?;
        self.directory
            .occupant(match_id, slot)
            .ok_or_else(|| FacadeError::EmptySlot { match_id: match_id.clone(), team, class: class.to_string() })
    }

    pub fn get_name_from_steam_id(&self, steam_id: &SteamId) -> Result<String, FacadeError> {
        self.directory.player_name(steam_id).ok_or_else(|| FacadeError::UnknownPlayer(steam_id.clone()))
    }

    /// Unknown matches and players are simply not allowed.
    pub fn is_allowed(&self, match_id: &MatchId, steam_id: &SteamId) -> bool {
        self.directory.is_allowed(match_id, steam_id)
    }

    pub fn handle(&self, request: FacadeRequest) -> Outcome<FacadeReply> {
        let result = match &request {
            FacadeRequest::GetPlayerId { steam_id } => self.get_player_id(steam_id).map(FacadeReply::PlayerId),
            FacadeRequest::GetTeam { match_id, steam_id } => self.get_team(match_id, steam_id).map(FacadeReply::Team),
            FacadeRequest::GetSteamIdFromSlot { match_id, team, class } => {
                self.get_steam_id_from_slot(match_id, *team, class).map(FacadeReply::SteamId)
            }
            FacadeRequest::GetNameFromSteamId { steam_id } => self.get_name_from_steam_id(steam_id).map(FacadeReply::Name),
            FacadeRequest::IsAllowed { match_id, steam_id } => Ok(FacadeReply::Allowed(self.is_allowed(match_id, steam_id))),
        };

        if let Err(e) = &result {
            log::debug!("{} failed: {}", request.method(), e);
        }
        result.map_err(|e| e.to_string()).into()
    }
}
