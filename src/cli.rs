//! Command-line interface definitions.
//!
//! Defines all CLI arguments using clap. Every flag can also be set through
//! a `WIKIMD_*` environment variable; explicit flags win over the
//! environment.

use clap::Parser;
use std::path::PathBuf;

/// WikiMD local wiki server CLI
#[derive(Parser, Debug, Clone)]
#[command(name = "wikimd", version, about, long_about = None)]
pub struct Cli {
    /// Root directory containing markdown files
    #[arg(short, long, env = "WIKIMD_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Port to bind the HTTP server (0 = auto-assign)
    #[arg(short, long, env = "WIKIMD_PORT", default_value_t = 0)]
    pub port: u16,

    /// Open the browser automatically after start
    #[arg(long, env = "WIKIMD_AUTO_OPEN", action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", default_value_t = true)]
    pub auto_open: bool,

    /// Enable dark theme by default
    #[arg(long, env = "WIKIMD_DARK", action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", default_value_t = true)]
    pub dark: bool,

    /// Directory containing built frontend assets (overrides embedded)
    #[arg(long, env = "WIKIMD_ASSETS")]
    pub assets: Option<PathBuf>,

    /// Include hidden files and directories in the wiki tree
    #[arg(long, env = "WIKIMD_INCLUDE_HIDDEN")]
    pub include_hidden: bool,

    /// Enable verbose logging (HTTP requests)
    #[arg(short, long, env = "WIKIMD_VERBOSE")]
    pub verbose: bool,
}
