use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "keep",
    about = "Keep -- local history for a directory of projects",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Workspace config file (keep.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Workspace root; overrides the config file
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum DepthArg {
    Zero,
    One,
    Infinite,
}

#[derive(Subcommand)]
pub enum Command {
    /// Synchronize with the file system and report what changed
    Refresh(RefreshArgs),
    /// Record the current content of a file
    Snapshot(PathArgs),
    /// List the recorded states of a file
    History(PathArgs),
    /// Print the content of one state
    Show(StateArgs),
    /// Overwrite a file with one of its states
    Restore(StateArgs),
    /// List deleted files that still have history
    Deleted(RefreshArgs),
    /// Copy or move history between paths
    CopyHistory(CopyHistoryArgs),
    /// Move a resource, taking its history along
    Mv(TransferArgs),
    /// Copy a resource together with its history
    Cp(TransferArgs),
    /// Apply the retention policy
    Clean,
    /// Delete content no state refers to
    Gc,
    /// Get or set a resource property
    Prop(PropArgs),
}

#[derive(Args)]
pub struct RefreshArgs {
    #[arg(default_value = "/")]
    pub path: String,
    #[arg(short, long, value_enum, default_value = "infinite")]
    pub depth: DepthArg,
}

#[derive(Args)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Args)]
pub struct StateArgs {
    pub path: String,
    /// Position in the history, 0 being the newest state
    #[arg(short, long, default_value = "0")]
    pub index: usize,
}

#[derive(Args)]
pub struct CopyHistoryArgs {
    pub from: String,
    pub to: String,
    /// Remove the history from the source afterwards
    #[arg(long = "move")]
    pub move_history: bool,
}

#[derive(Args)]
pub struct TransferArgs {
    pub from: String,
    pub to: String,
}

#[derive(Args)]
pub struct PropArgs {
    pub path: String,
    pub key: Option<String>,
    pub value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_refresh_defaults() {
        let cli = Cli::try_parse_from(["keep", "refresh"]).unwrap();
        if let Command::Refresh(args) = cli.command {
            assert_eq!(args.path, "/");
            assert!(matches!(args.depth, DepthArg::Infinite));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_refresh_depth() {
        let cli = Cli::try_parse_from(["keep", "refresh", "/proj", "-d", "one"]).unwrap();
        if let Command::Refresh(args) = cli.command {
            assert_eq!(args.path, "/proj");
            assert!(matches!(args.depth, DepthArg::One));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_show_index() {
        let cli = Cli::try_parse_from(["keep", "show", "/proj/f", "--index", "2"]).unwrap();
        if let Command::Show(args) = cli.command {
            assert_eq!(args.path, "/proj/f");
            assert_eq!(args.index, 2);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_copy_history_move() {
        let args = ["keep", "copy-history", "/a/x", "/b/x", "--move"];
        let cli = Cli::try_parse_from(args).unwrap();
        if let Command::CopyHistory(args) = cli.command {
            assert_eq!(args.from, "/a/x");
            assert_eq!(args.to, "/b/x");
            assert!(args.move_history);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_prop_set() {
        let cli = Cli::try_parse_from(["keep", "prop", "/p/f", "charset", "utf-8"]).unwrap();
        if let Command::Prop(args) = cli.command {
            assert_eq!(args.key.as_deref(), Some("charset"));
            assert_eq!(args.value.as_deref(), Some("utf-8"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_globals() {
        let args = ["keep", "gc", "--verbose", "--format", "json", "-r", "/w"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.format, OutputFormat::Json));
        assert_eq!(cli.root, Some(PathBuf::from("/w")));
        assert!(matches!(cli.command, Command::Gc));
    }

    #[test]
    fn parse_mv_and_cp() {
        let cli = Cli::try_parse_from(["keep", "mv", "/p/a", "/p/b"]).unwrap();
        if let Command::Mv(args) = cli.command {
            assert_eq!((args.from.as_str(), args.to.as_str()), ("/p/a", "/p/b"));
        } else { panic!("wrong command"); }
        let cli = Cli::try_parse_from(["keep", "cp", "/p/a", "/q/a"]).unwrap();
        assert!(matches!(cli.command, Command::Cp(_)));
        assert!(Cli::try_parse_from(["keep", "mv", "/p/a"]).is_err());
    }

    #[test]
    fn rejects_unknown_depth() {
        assert!(Cli::try_parse_from(["keep", "refresh", "-d", "two"]).is_err());
    }
}
