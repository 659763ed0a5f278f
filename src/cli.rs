use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(version)]
#[command(about = "Apply dependency-ordered infrastructure resources with helm, kubectl and terraform", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply every resource in a resource set
    Apply(ApplyArgs),

    /// Check a resource set without applying anything
    Validate(FileArgs),

    /// Show the waves an apply would run
    Plan(FileArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct FileArgs {
    /// Resource set file (.json, .toml, .yaml or .yml)
    pub file: PathBuf,

    /// Driver for resources that do not name one
    #[arg(long, env = "SWITCHBOARD_DEFAULT_DRIVER")]
    pub default_driver: Option<String>,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub input: FileArgs,

    /// Directory relative source paths resolve against
    #[arg(long, env = "SWITCHBOARD_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Write resolved queries to this JSON file after a successful apply
    #[arg(short, long)]
    pub outputs: Option<PathBuf>,

    /// Query to resolve against resource outputs (repeatable)
    #[arg(long = "query", value_name = "KEY=EXPR", requires = "outputs")]
    pub queries: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "switchboard",
            "-v",
            "apply",
            "set.toml",
            "--yes",
            "--outputs",
            "out.json",
            "--query",
            "host={ .db.host }",
            "--query",
            "port={ .db.port }",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.input.file, PathBuf::from("set.toml"));
        assert!(args.yes);
        assert_eq!(args.outputs, Some(PathBuf::from("out.json")));
        assert_eq!(args.queries.len(), 2);
    }

    #[test]
    fn test_query_requires_outputs() {
        assert!(
            Cli::try_parse_from(["switchboard", "apply", "set.json", "--query", "a={ .a }"])
                .is_err()
        );
    }
}
