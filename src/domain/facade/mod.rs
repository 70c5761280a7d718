pub mod facade;
pub mod facade_server;
pub mod match_directory;
