use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Clone, Debug, Parser)]
#[command(name = "pkgmirror", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct App {
    /// Path to the TOML configuration. A missing file means built-in defaults.
    #[arg(short, long, env = "PKGMIRROR_CONFIG", default_value = "pkgmirror.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Fetch everything upstream has that the mirror lacks, then publish the new index.
    #[command(alias = "s", name = "sync")]
    Sync,
    /// Verify every leaf referenced by the committed index without fetching.
    #[command(alias = "c", name = "check")]
    Check,
    /// Delete superseded files whose grace period has elapsed.
    #[command(alias = "r", name = "reclaim")]
    Reclaim,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() { App::command().debug_assert(); }

    #[test]
    fn test_parse_subcommands() {
        let app = App::try_parse_from(["pkgmirror", "--config", "/etc/pkgmirror.toml", "sync"]).unwrap();
        assert_eq!(app.config, PathBuf::from("/etc/pkgmirror.toml"));
        assert!(matches!(app.cmd, Commands::Sync));

        let app = App::try_parse_from(["pkgmirror", "r"]).unwrap();
        assert!(matches!(app.cmd, Commands::Reclaim));

        assert!(App::try_parse_from(["pkgmirror"]).is_err());
    }
}
