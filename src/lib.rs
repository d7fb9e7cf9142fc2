pub mod cli;
pub mod gcs;
pub mod load_config;

pub use cli::{run, Cli, Commands};
