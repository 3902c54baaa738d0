use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::MigrationConfig;
use crate::context::Direction;
use crate::org::Scope;

#[derive(Parser, Debug)]
#[command(name = "tshift")]
#[command(about = "Move tenant service instances between foundations", long_about = None)]
pub struct Cli {
    /// Configuration file (.toml or .json)
    #[arg(short, long, env = "TSHIFT_CONFIG", default_value = "tshift.toml", global = true)]
    pub config: PathBuf,

    /// Directory holding exported records
    #[arg(long, global = true)]
    pub export_dir: Option<PathBuf>,

    /// Only organizations matching this pattern (repeatable)
    #[arg(long = "include-org", global = true)]
    pub include_orgs: Vec<String>,

    /// Skip organizations matching this pattern (repeatable)
    #[arg(long = "exclude-org", global = true)]
    pub exclude_orgs: Vec<String>,

    /// Only instances with this name (repeatable)
    #[arg(long = "instance", global = true)]
    pub instances: Vec<String>,

    /// Read and write files but change nothing on either foundation
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Export from the source foundation to files
    Export(ScopeArgs),
    /// Import files into the target foundation
    Import(ScopeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    #[command(subcommand)]
    pub scope: ScopeCmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ScopeCmd {
    /// Every organization passing the filters
    All,
    /// One organization
    Org { name: String },
    /// One space
    Space { org: String, space: String },
}

impl Cli {
    /// Export or import, from the subcommand.
    pub fn direction(&self) -> Direction {
        match self.command {
            Command::Export(_) => Direction::Export,
            Command::Import(_) => Direction::Import,
        }
    }

    /// Orgs and spaces selected by the scope subcommand.
    pub fn scope(&self) -> Scope {
        let (Command::Export(args) | Command::Import(args)) = &self.command;
        match &args.scope {
            ScopeCmd::All => Scope::All,
            ScopeCmd::Org { name } => Scope::Org(name.clone()),
            ScopeCmd::Space { org, space } => Scope::Space {
                org: org.clone(),
                space: space.clone(),
            },
        }
    }

    /// Overrides file settings with flags given on the command line.
    pub fn apply(&self, config: &mut MigrationConfig) {
        if let Some(dir) = &self.export_dir {
            config.export_dir = dir.clone();
        }
        if !self.include_orgs.is_empty() {
            config.include_orgs = self.include_orgs.clone();
        }
        if !self.exclude_orgs.is_empty() {
            config.exclude_orgs = self.exclude_orgs.clone();
        }
        if !self.instances.is_empty() {
            config.instances = self.instances.clone();
        }
        if self.dry_run {
            config.dry_run = true;
        }
    }
}
