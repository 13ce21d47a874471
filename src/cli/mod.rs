//! Command-line interface components
//!
//! This module contains CLI-specific code for HB Fetcher: argument parsing,
//! command handlers and the progress display.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{Cli, Commands, DownloadArgs, GlobalArgs, ListArgs};
pub use commands::{
    format_bytes, format_order_lines, handle_download, handle_list, resolve_credential,
};
pub use progress::{ProgressConfig, ProgressDisplay};
