use std::path::Path;

use crate::api::match_plan_dto::MatchPlanDto;
use crate::error::Result;
use crate::loader::parser::parse_json_file;

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

pub fn load_match_plan(file_path: &Path) -> Result<MatchPlanDto> {
    let plan: MatchPlanDto = parse_json_file(file_path)?;
    log::info!("Loaded plan for match {} ({} players) from '{}'.", plan.match_id, plan.players.len(), file_path.display());
    Ok(plan)
}
