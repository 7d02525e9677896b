// Crate root library declaration and module exports.
pub mod cache;
pub mod calendar_config;
pub mod cli;
pub mod config;
pub mod context;
pub mod model;
pub mod parser;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod system;
