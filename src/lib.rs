pub mod actuator;
pub mod allocation;
pub mod api;
pub mod command;
pub mod config;
pub mod control;
pub mod error;
pub mod occupancy;
pub mod registry;
pub mod sensor;
pub mod sim;
pub mod state;
pub mod status;
