pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod executor;
pub mod indicators;
pub mod models;
pub mod params;
pub mod performance;
pub mod report;
pub mod simulator;
pub mod strategy;
pub mod sweep_status;
