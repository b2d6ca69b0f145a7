pub mod collect;
pub mod completions;
pub mod config;
pub mod export;
pub mod status;
