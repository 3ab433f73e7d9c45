pub mod app;
pub mod commands;
pub mod display;

pub use app::{App, BackoffStrategy, Config, HeartbeatSettings, ReconnectSettings};
pub use commands::{Cli, Commands, ConfigCommand};
pub use display::{format_event, format_link_event, print_event, print_link_event, OutputFormat};
