pub mod types;
pub mod error;
pub mod config;
pub mod settings;
pub mod stats;
pub mod locks;
pub mod refresher;
pub mod search_index;
pub mod engine;
