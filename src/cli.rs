use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "converge")]
#[command(version)]
#[command(about = "Declarative resource provisioning - plan, apply, converge", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the stackfile
    #[arg(short = 'f', long, global = true, default_value = "stack.toml")]
    pub file: PathBuf,

    /// Directory for stack state blobs (default: .converge/state next to
    /// the stackfile)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what apply would change
    Plan,

    /// Converge physical resources to the declared state
    Apply(ApplyArgs),

    /// Delete every resource recorded for the stack
    Destroy(DestroyArgs),

    /// Print stack outputs resolved from recorded state
    Outputs(OutputsArgs),

    /// Show the recorded stack state
    State,

    /// Compare recorded state against physical resources
    Refresh,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args)]
pub struct ApplyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Show the plan without applying it
    #[arg(long)]
    pub dry_run: bool,

    /// Worker threads for resources on independent branches
    #[arg(short, long, default_value_t = 4)]
    pub jobs: usize,

    /// Per-operation timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,
}

#[derive(clap::Args)]
pub struct DestroyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Worker threads for resources on independent branches
    #[arg(short, long, default_value_t = 4)]
    pub jobs: usize,

    /// Per-operation timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,
}

#[derive(clap::Args)]
pub struct OutputsArgs {
    /// Emit outputs as a JSON object
    #[arg(long)]
    pub json: bool,
}
