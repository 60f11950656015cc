pub mod adapters;
pub mod commands;
pub mod config;
pub mod desk;
pub mod domain;
pub mod ports;
pub mod telemetry;
