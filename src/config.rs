//! Runtime configuration derived from CLI arguments and environment.
//!
//! The CLI layer ([`crate::cli`]) owns flag parsing; this module validates
//! and normalizes the result into an immutable [`Config`] the rest of the
//! process reads. Paths are absolutized once here so every downstream
//! component can compare them lexically.

use crate::cli::Cli;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("root directory `{0}` does not exist or is not a directory")]
    InvalidRoot(PathBuf),

    #[error("failed to resolve `{0}`")]
    Resolve(PathBuf, #[source] std::io::Error),
}

/// Validated runtime configuration for the wiki server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Absolute root directory of the wiki content.
    pub root: PathBuf,
    /// Port to bind; 0 means auto-assign on localhost.
    pub port: u16,
    /// Open the browser once the server is listening.
    pub auto_open: bool,
    /// Serve the dark theme by default.
    pub dark: bool,
    /// Optional filesystem override for the embedded frontend assets.
    pub assets_dir: Option<PathBuf>,
    /// Include hidden files and directories in the tree and watcher.
    pub include_hidden: bool,
    /// Log every HTTP request.
    pub verbose: bool,
}

impl Config {
    /// Validate CLI input and normalize paths.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let root = cli
            .root
            .canonicalize()
            .map_err(|e| ConfigError::Resolve(cli.root.clone(), e))?;
        if !root.is_dir() {
            return Err(ConfigError::InvalidRoot(root));
        }

        // A missing assets override falls back to the embedded set at
        // request time, so only resolve it when the directory exists.
        let assets_dir = match &cli.assets {
            Some(dir) if dir.is_dir() => Some(
                dir.canonicalize()
                    .map_err(|e| ConfigError::Resolve(dir.clone(), e))?,
            ),
            Some(dir) => {
                crate::log!("serve"; "assets dir {} not found, using embedded assets", dir.display());
                None
            }
            None => None,
        };

        Ok(Self {
            root,
            port: cli.port,
            auto_open: cli.auto_open,
            dark: cli.dark,
            assets_dir,
            include_hidden: cli.include_hidden,
            verbose: cli.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli_for(root: &std::path::Path) -> Cli {
        Cli::parse_from(["wikimd", "--root", root.to_str().unwrap(), "--auto-open", "false"])
    }

    #[test]
    fn test_valid_root_is_absolutized() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_cli(&cli_for(dir.path())).unwrap();
        assert!(config.root.is_absolute());
        assert!(!config.auto_open);
    }

    #[test]
    fn test_missing_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let cli = Cli::parse_from(["wikimd", "--root", missing.to_str().unwrap()]);
        assert!(Config::from_cli(&cli).is_err());
    }

    #[test]
    fn test_missing_assets_dir_falls_back_to_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from([
            "wikimd",
            "--root",
            dir.path().to_str().unwrap(),
            "--assets",
            "/definitely/not/here",
        ]);
        let config = Config::from_cli(&cli).unwrap();
        assert!(config.assets_dir.is_none());
    }
}
