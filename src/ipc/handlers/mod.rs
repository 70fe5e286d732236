pub mod analysis;
pub mod config;
pub mod core;
pub mod dashboard;
