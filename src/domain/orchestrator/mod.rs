pub mod orchestrator;
pub mod report;
pub mod roster;
pub mod state;
