use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reservation object exactly as the reservation service encodes it.
///
/// Every field is optional on the wire: the service omits secrets until the
/// reservation is active and the archive URL until it has ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservationDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub starts_at: String,
    #[serde(default)]
    pub ends_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rcon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_map: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelist_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_config_id: Option<u64>,
    #[serde(default, rename = "logsecret", skip_serializing_if = "Option::is_none")]
    pub log_secret: Option<String>,
    #[serde(default, skip_serializing)]
    pub ended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zipfile_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerDto>,
    /// Field -> message(s). Values are strings or arrays of strings depending on the endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerDto {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub ip_and_port: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileDto {
    pub id: u64,
    pub file: String,
}

/// Response envelope shared by every reservation endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservationResponseDto {
    #[serde(default)]
    pub reservation: ReservationDto,
    #[serde(default)]
    pub servers: Vec<ServerDto>,
    #[serde(default)]
    pub server_configs: Vec<FileDto>,
    #[serde(default)]
    pub whitelists: Vec<FileDto>,
    #[serde(default)]
    pub actions: HashMap<String, String>,
}

/// Request body for create and find: a single top-level `reservation` object.
#[derive(Debug, Serialize)]
pub struct ReservationRequestDto<'a> {
    pub reservation: &'a ReservationDto,
}
