//! CLI routing and command dispatch.

use crate::core::audit_log::{self, Journal};
use crate::core::controller::{self, Controller};
use crate::core::file_lock::FileLock;
use crate::core::flows::Session;
use crate::core::pacing::ThreadSleeper;
use crate::core::paths::WorkspacePaths;
use crate::core::settings;
use crate::models::settings::Settings;
use crate::provider::iam::IamClient;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod audit;
pub mod factory;
pub mod issue;
pub mod list;
pub mod prompt;
pub mod purge;

/// Shared context passed to all command handlers.
pub struct CliContext {
    pub paths: WorkspacePaths,
    pub settings: Settings,
    pub non_interactive: bool,
    /// Explicit controller credential from `--credentials`.
    pub credentials: Option<PathBuf>,
}

/// An authenticated connection to the project named in the controller credential.
pub struct Remote {
    pub controller: Controller,
    pub client: IamClient,
}

impl CliContext {
    /// Load the controller credential and build the IAM client.
    pub fn connect(&self) -> Result<Remote> {
        let path = controller::discover(&self.paths, self.credentials.as_deref())?;
        let controller = controller::load(&path)?;
        let client = IamClient::new(&controller.credential, &self.settings.provider)
            .with_context(|| format!("set up IAM client from {}", path.display()))?;
        Ok(Remote { controller, client })
    }

    pub fn journal(&self, project: &str) -> Journal {
        Journal::new(
            &self.paths.audit_log,
            &self.paths.audit_lock,
            project,
            &audit_log::detect_actor(),
        )
    }

    /// Hold the workspace run lock for a mutating command.
    pub fn lock_run(&self) -> Result<FileLock> {
        FileLock::for_run(&self.paths.run_lock)
    }
}

impl Remote {
    pub fn project(&self) -> &str {
        &self.controller.project_id
    }

    /// A real-time session against this remote.
    pub fn session<'a>(&'a self, ctx: &'a CliContext, journal: &'a Journal) -> Session<'a> {
        Session {
            provider: &self.client,
            project: self.project(),
            settings: &ctx.settings,
            sleeper: &ThreadSleeper,
            journal: Some(journal),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "keyfleet",
    version,
    about = "Batch lifecycle management for cloud service account keys"
)]
pub struct Cli {
    /// Workspace directory (default: $KEYFLEET_ROOT or the current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub root: Option<PathBuf>,

    /// Controller credential file (default: credentials.json, then controller/*.json)
    #[arg(long, global = true, value_name = "FILE")]
    pub credentials: Option<PathBuf>,

    /// Run in non-interactive mode (no prompts, suitable for automation)
    #[arg(long, global = true, env = "KEYFLEET_NON_INTERACTIVE")]
    pub non_interactive: bool,

    /// Give up on items still failing after this many passes (default: never)
    #[arg(long, global = true, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_passes: Option<u32>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let paths = WorkspacePaths::resolve(self.root)?;
        let mut settings = settings::load(&paths.settings)?;
        if self.max_passes.is_some() {
            settings.retry.max_passes = self.max_passes;
        }
        tracing::debug!(workspace = %paths, "resolved workspace");

        let ctx = CliContext {
            paths,
            settings,
            non_interactive: self.non_interactive,
            credentials: self.credentials,
        };

        match self.command {
            Commands::List(args) => list::run(&ctx, args),
            Commands::Issue(args) => issue::run(&ctx, args),
            Commands::Purge(args) => purge::run(&ctx, args),
            Commands::Factory(args) => factory::run(&ctx, args),
            Commands::Audit { command } => audit::run(&ctx, command),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List service accounts matching a prefix
    List(list::ListArgs),
    /// Issue one new key for every account matching a prefix (old keys are kept)
    Issue(issue::IssueArgs),
    /// Delete all user-managed keys of the accounts matching a prefix
    Purge(purge::PurgeArgs),
    /// Ensure prefix-001..prefix-N exist and give each exactly one fresh key
    Factory(factory::FactoryArgs),
    /// View or verify the audit journal
    Audit {
        #[command(subcommand)]
        command: audit::AuditCommand,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_factory_flags() {
        let cli = Cli::try_parse_from([
            "keyfleet",
            "--root",
            "/work",
            "factory",
            "--prefix",
            "sa",
            "--count",
            "12",
            "--yes",
        ])
        .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/work")));
        match cli.command {
            Commands::Factory(args) => {
                assert_eq!(args.prefix.as_deref(), Some("sa"));
                assert_eq!(args.count, Some(12));
                assert!(args.yes);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_max_passes_must_be_positive() {
        assert!(Cli::try_parse_from(["keyfleet", "--max-passes", "0", "list"]).is_err());
        let cli = Cli::try_parse_from(["keyfleet", "--max-passes", "3", "list"]).unwrap();
        assert_eq!(cli.max_passes, Some(3));
    }
}
