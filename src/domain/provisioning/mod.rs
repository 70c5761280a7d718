pub mod command;
pub mod provisioning_client;
