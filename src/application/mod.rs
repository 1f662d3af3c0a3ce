pub mod bootstrap;
pub mod commands;
pub mod refresh;
pub mod scheduler;
pub mod session_client;
pub mod single_flight;
pub mod status;
