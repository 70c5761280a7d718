use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::api::reservation_dto::{FileDto, ReservationDto, ReservationResponseDto, ServerDto};
use crate::error::{Error, Result};

/// Timestamp layout shared with the reservation service: `YYYY-MM-DDTHH:MM:SS.sss±HH:MM`.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";
// Parsing accepts any number of fractional digits, including none.
const PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%:z";

pub fn format_time(time: &DateTime<FixedOffset>) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub fn parse_time(value: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_str(value, PARSE_FORMAT).map_err(|source| Error::TimeParse { value: value.to_string(), source })
}

/// Identifier assigned by the reservation service on successful creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReservationId(pub u64);

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Remote lifecycle of a reservation. Only these four values are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationStatus {
    Requested,
    Active,
    Ended,
    Error,
}

impl FromStr for ReservationStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<ReservationStatus> {
        match value.trim().to_ascii_lowercase().as_str() {
            "requested" => Ok(ReservationStatus::Requested),
            "active" => Ok(ReservationStatus::Active),
            "ended" => Ok(ReservationStatus::Ended),
            "error" => Ok(ReservationStatus::Error),
            other => Err(Error::Decode(format!("unrecognized reservation status '{}'", other))),
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReservationStatus::Requested => "requested",
            ReservationStatus::Active => "active",
            ReservationStatus::Ended => "ended",
            ReservationStatus::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationWindow {
    pub starts: DateTime<FixedOffset>,
    pub ends: DateTime<FixedOffset>,
}

impl ReservationWindow {
    pub fn new(starts: DateTime<FixedOffset>, ends: DateTime<FixedOffset>) -> Result<Self> {
        if ends <= starts {
            return Err(Error::Config(format!("reservation window ends ({}) before it starts ({})", ends, starts)));
        }
        Ok(Self { starts, ends })
    }

    fn from_dto(dto: &ReservationDto) -> Result<Self> {
        Ok(Self { starts: parse_time(&dto.starts_at)?, ends: parse_time(&dto.ends_at)? })
    }
}

/// Snapshot of a physical server: who it is and where it listens.
///
/// The rcon and server passwords travel with it because the control service
/// needs them to take over the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub server_id: Option<u64>,
    pub name: String,
    pub host: String,
    pub rcon_password: String,
    pub server_password: String,
}

impl ServerDescriptor {
    fn from_dto(dto: &ServerDto) -> Self {
        Self { server_id: dto.id, name: dto.name.clone(), host: dto.ip_and_port.clone(), ..Default::default() }
    }
}

/// Secrets the service hands out once the reservation is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSecrets {
    pub rcon_password: String,
    pub rcon_address: String,
    pub log_secret: String,
}

/// What we ask the reservation service for.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationDraft {
    pub window: ReservationWindow,
    pub server_id: u64,
    pub rcon_password: String,
    pub server_password: String,
    pub first_map: Option<String>,
    pub whitelist_id: Option<u64>,
    pub server_config_id: Option<u64>,
}

impl ReservationDraft {
    pub fn to_dto(&self) -> ReservationDto {
        ReservationDto {
            starts_at: format_time(&self.window.starts),
            ends_at: format_time(&self.window.ends),
            server_id: Some(self.server_id),
            rcon: Some(self.rcon_password.clone()),
            password: Some(self.server_password.clone()),
            first_map: self.first_map.clone(),
            whitelist_id: self.whitelist_id,
            server_config_id: self.server_config_id,
            ..Default::default()
        }
    }
}

/// A held server allocation as last reported by the reservation service.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub id: ReservationId,
    pub window: ReservationWindow,
    pub status: ReservationStatus,
    pub ended: bool,
    pub server_id: Option<u64>,
    pub server: Option<ServerDescriptor>,
    pub secrets: Option<ConnectionSecrets>,
    pub artifact_url: Option<String>,
    pub errors: BTreeMap<String, String>,
}

impl Reservation {
    /// The service reports the end either through the flag or the status; both count.
    pub fn has_ended(&self) -> bool {
        self.ended || self.status == ReservationStatus::Ended
    }

    /// Descriptor the control service should take over, combining the assigned
    /// server with the passwords we requested.
    pub fn descriptor(&self, draft: &ReservationDraft) -> ServerDescriptor {
        let mut descriptor = self.server.clone().unwrap_or_default();
        if descriptor.server_id.is_none() {
            descriptor.server_id = self.server_id;
        }
        descriptor.rcon_password = draft.rcon_password.clone();
        descriptor.server_password = draft.server_password.clone();
        if let Some(secrets) = &self.secrets {
            descriptor.rcon_password = secrets.rcon_password.clone();
            if descriptor.host.is_empty() {
                descriptor.host = secrets.rcon_address.clone();
            }
        }
        descriptor
    }
}

impl TryFrom<ReservationDto> for Reservation {
    type Error = Error;

    fn try_from(dto: ReservationDto) -> Result<Self> {
        let id = dto.id.map(ReservationId).ok_or_else(|| Error::Decode("reservation response carries no id".into()))?;
        let status = match dto.status.as_deref() {
            Some(raw) => ReservationStatus::from_str(raw)?,
            None => return Err(Error::Decode(format!("reservation {} carries no status", id))),
        };
        let window = ReservationWindow::from_dto(&dto)?;

        let secrets = match (status, &dto.rcon) {
            (ReservationStatus::Active, Some(rcon)) => Some(ConnectionSecrets {
                rcon_password: rcon.clone(),
                rcon_address: dto.server.as_ref().map(|s| s.ip_and_port.clone()).unwrap_or_default(),
                log_secret: dto.log_secret.clone().unwrap_or_default(),
            }),
            _ => None,
        };

        let ended = reports_ended(&dto);
        let artifact_url = if ended { dto.zipfile_url.clone().filter(|url| !url.is_empty()) } else { None };

        Ok(Reservation {
            id,
            window,
            status,
            ended: dto.ended,
            server_id: dto.server_id,
            server: dto.server.as_ref().map(ServerDescriptor::from_dto),
            secrets,
            artifact_url,
            errors: flatten_errors(dto.errors.as_ref()),
        })
    }
}

/// Candidates returned by `find_servers`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerCandidates {
    pub servers: Vec<ServerDescriptor>,
    pub server_configs: Vec<(u64, String)>,
    pub whitelists: Vec<(u64, String)>,
    pub actions: BTreeMap<String, String>,
}

impl From<ReservationResponseDto> for ServerCandidates {
    fn from(dto: ReservationResponseDto) -> Self {
        let files = |files: Vec<FileDto>| files.into_iter().map(|f| (f.id, f.file)).collect();
        ServerCandidates {
            servers: dto.servers.iter().map(ServerDescriptor::from_dto).collect(),
            server_configs: files(dto.server_configs),
            whitelists: files(dto.whitelists),
            actions: dto.actions.into_iter().collect(),
        }
    }
}

/// True when the explicit flag is set or the status reads `ended`. Looks at nothing else,
/// so a reservation with missing times or an unknown status still answers.
pub fn reports_ended(dto: &ReservationDto) -> bool {
    dto.ended || dto.status.as_deref().is_some_and(|status| status.trim().eq_ignore_ascii_case("ended"))
}

pub(crate) fn flatten_errors(errors: Option<&std::collections::HashMap<String, serde_json::Value>>) -> BTreeMap<String, String> {
    let Some(errors) = errors else {
        return BTreeMap::new();
    };
    errors
        .iter()
        .map(|(field, value)| {
            let message = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Array(items) => {
                    items.iter().map(|item| item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string())).collect::<Vec<_>>().join("; ")
                }
                other => other.to_string(),
            };
            (field.clone(), message)
        })
        .collect()
}
