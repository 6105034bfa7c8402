// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// One subcommand per identifier kind (github, repo, domain). They all share
// the same input and output flags through `CheckArgs`.
// =============================================================================

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use nameprobe::checker::{CheckContext, CheckKind};
use nameprobe::engine::{DispatchOptions, DEFAULT_MAX_ATTEMPTS};

#[derive(Parser, Debug)]
#[command(
    name = "nameprobe",
    version,
    about = "Check whether GitHub usernames, repository names and domains are available",
    long_about = "nameprobe checks GitHub usernames, repository names under an owner, and domain \
                  names for availability. Set GITHUB_TOKEN (environment or .env) to raise the \
                  GitHub rate limit from 60 to 5000 requests per hour."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check GitHub username availability
    ///
    /// Example: nameprobe github octocat my-new-handle
    Github {
        #[command(flatten)]
        args: CheckArgs,
    },

    /// Check repository names under a GitHub user or organization
    ///
    /// Example: nameprobe repo --owner rust-lang rust some-new-repo
    Repo {
        /// GitHub user or organization that would own the repositories
        #[arg(short, long)]
        owner: String,

        #[command(flatten)]
        args: CheckArgs,
    },

    /// Check domain names (a name that resolves is considered taken)
    ///
    /// Example: nameprobe domain example.com my-startup.dev
    Domain {
        #[command(flatten)]
        args: CheckArgs,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Identifiers to check (also read from --file and piped stdin)
    pub names: Vec<String>,

    /// File with one identifier per line
    #[arg(short, long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Check one identifier at a time instead of concurrently
    #[arg(long)]
    pub sync: bool,

    /// Maximum concurrent lookups (default: up to 10)
    #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..=64))]
    pub concurrency: Option<u16>,

    /// Lookups per identifier before giving up
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_ATTEMPTS,
          value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_attempts: u32,

    /// Output results in JSON format instead of a table
    #[arg(long)]
    pub json: bool,

    /// Only print available identifiers
    #[arg(short, long)]
    pub available_only: bool,

    /// Don't print per-identifier progress to stderr
    #[arg(short, long)]
    pub quiet: bool,
}

impl CheckArgs {
    pub fn dispatch_options(&self) -> DispatchOptions {
        if self.sync {
            DispatchOptions::sequential()
        } else {
            DispatchOptions {
                concurrency: self.concurrency.map(usize::from),
                ..DispatchOptions::default()
            }
        }
    }
}

impl Commands {
    pub fn kind(&self) -> CheckKind {
        match self {
            Commands::Github { .. } => CheckKind::GitHubUsername,
            Commands::Repo { .. } => CheckKind::GitHubRepo,
            Commands::Domain { .. } => CheckKind::Domain,
        }
    }

    pub fn args(&self) -> &CheckArgs {
        match self {
            Commands::Github { args } | Commands::Repo { args, .. } | Commands::Domain { args } => args,
        }
    }

    pub fn context(&self) -> CheckContext {
        match self {
            Commands::Repo { owner, .. } => CheckContext::with_owner(owner.trim()),
            _ => CheckContext::default(),
        }
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. What does #[command(flatten)] do?
//    - It pulls every field of CheckArgs into the subcommand as if they
//      were declared there
//    - All three subcommands get the same flags without repeating them
//
// 2. Why Option<u16> for --concurrency?
//    - None means "not given", so the engine can pick its own default
//    - value_parser!(u16).range(1..=64) rejects 0 and silly values before
//      our code ever runs
//
// 3. Why is `owner` a plain String and not Option<String>?
//    - A required field makes clap itself report a missing --owner as a
//      usage error (exit code 2)
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use nameprobe::engine::Mode;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_repo_command() {
        let cli = Cli::try_parse_from(["nameprobe", "repo", "--owner", "rust-lang", "rust", "cargo", "--json"]).unwrap();
        assert_eq!(cli.command.kind(), CheckKind::GitHubRepo);
        assert_eq!(cli.command.context(), CheckContext::with_owner("rust-lang"));
        let args = cli.command.args();
        assert_eq!(args.names, vec!["rust", "cargo"]);
        assert!(args.json);
        assert_eq!(args.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_repo_requires_owner() {
        assert!(Cli::try_parse_from(["nameprobe", "repo", "rust"]).is_err());
    }

    #[test]
    fn test_sync_flag_selects_sequential_mode() {
        let cli = Cli::try_parse_from(["nameprobe", "github", "--sync", "-c", "8", "octocat"]).unwrap();
        assert_eq!(cli.command.args().dispatch_options().mode, Mode::Sequential);

        let cli = Cli::try_parse_from(["nameprobe", "domain", "-c", "8", "example.com"]).unwrap();
        let options = cli.command.args().dispatch_options();
        assert_eq!(options.mode, Mode::Concurrent);
        assert_eq!(options.concurrency, Some(8));
    }

    #[test]
    fn test_concurrency_bounds() {
        assert!(Cli::try_parse_from(["nameprobe", "github", "-c", "0", "octocat"]).is_err());
        assert!(Cli::try_parse_from(["nameprobe", "github", "--max-attempts", "0", "octocat"]).is_err());
    }
}
