//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Time tracking for crafters.
///
/// Records a session against a project and keeps its row up to date in a
/// local CSV file and/or a Google spreadsheet while it runs.
#[derive(Debug, Parser)]
#[command(name = "craftie", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start a session and sync it until interrupted or the duration elapses.
    #[command(visible_alias = "s")]
    Start {
        /// Project name.
        #[arg(short, long)]
        project: String,

        /// Session notes.
        #[arg(short, long, default_value = "")]
        notes: String,

        /// Task within the project.
        #[arg(short, long, default_value = "")]
        task: String,

        /// End the session automatically after this long (e.g. 2h, 30m, 1h30m).
        #[arg(short, long)]
        duration: Option<String>,
    },

    /// Push finished sessions that have not reached the spreadsheet yet.
    Sync,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_accepts_short_flags_and_alias() {
        let cli = Cli::try_parse_from([
            "craftie", "s", "-p", "quilt", "-n", "binding", "-t", "edge", "-d", "1h30m",
        ])
        .unwrap();
        let Some(Commands::Start {
            project,
            notes,
            task,
            duration,
        }) = cli.command
        else {
            panic!("expected start command");
        };
        assert_eq!(project, "quilt");
        assert_eq!(notes, "binding");
        assert_eq!(task, "edge");
        assert_eq!(duration.as_deref(), Some("1h30m"));
    }

    #[test]
    fn start_requires_project() {
        assert!(Cli::try_parse_from(["craftie", "start"]).is_err());
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from(["craftie", "sync", "-v", "-c", "/tmp/c.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Some(Commands::Sync)));
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
