// Library root: storage, configuration, stat arithmetic and import plumbing
// shared by the model and the CLI.

pub mod config;
pub mod db;
pub mod import;
pub mod odds;
pub mod sport;
pub mod stats;
pub mod store;
