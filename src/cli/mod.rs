pub mod commands;
pub mod progress;
pub mod scan;
pub mod stop;

pub use commands::{Cli, Commands, LogFormat};
