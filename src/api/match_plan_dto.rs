use serde::Deserialize;

/// Match plan handed to the `provision` command.
///
/// Produced by whatever groups players into a match; this crate only consumes it.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchPlanDto {
    pub match_id: String,
    pub match_type: String,
    pub league: String,
    #[serde(default)]
    pub whitelist: String,
    pub map: String,
    /// Optional fixed window. Without it the next reservable window is used.
    #[serde(default)]
    pub starts_at: Option<String>,
    #[serde(default)]
    pub ends_at: Option<String>,
    pub server_id: u64,
    #[serde(default)]
    pub whitelist_id: Option<u64>,
    #[serde(default)]
    pub server_config_id: Option<u64>,
    #[serde(default)]
    pub players: Vec<PlayerDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerDto {
    pub steam_id: String,
    #[serde(default)]
    pub name: String,
    pub team: String,
    pub class: String,
}
