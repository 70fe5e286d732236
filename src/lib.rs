pub mod bundle;
pub mod config;
pub mod dashboard;
pub mod dataset;
pub mod db;
pub mod error;
pub mod grid;
pub mod header;
pub mod ipc;
pub mod join;
pub mod pipeline;
pub mod schema;
pub mod summary;
pub mod table;
