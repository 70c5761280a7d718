pub mod archive;
pub mod facade;
pub mod match_format;
pub mod orchestrator;
pub mod provisioning;
pub mod reservation;
pub mod rpc;
pub mod utils;
