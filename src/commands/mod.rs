//! Subcommand implementations.
//!
//! Every command follows the same arc: load the stackfile and recorded
//! state, wire providers for the type tags in play, hand everything to the
//! core, and render what came back.

pub mod apply;
pub mod destroy;
pub mod outputs;
pub mod plan;
pub mod refresh;
pub mod state;

use crate::cli::Cli;
use crate::provider::LocalProvider;
use crate::stackfile::Stackfile;
use anyhow::{Context as AnyhowContext, Result};
use reconcile::{FileStore, ProviderSet, StackState, StateStore};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Resolved paths and global flags for a single invocation.
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub stackfile_path: PathBuf,
    pub state_dir: PathBuf,
    pub objects_dir: PathBuf,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Self {
        let base = cli
            .file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .join(".converge");
        Self {
            verbose: cli.verbose,
            quiet: cli.quiet,
            stackfile_path: cli.file.clone(),
            state_dir: cli.state_dir.clone().unwrap_or_else(|| base.join("state")),
            objects_dir: base.join("objects"),
        }
    }
}

/// Load the stackfile and the stack's recorded state.
pub fn load_stack(ctx: &Context) -> Result<(Stackfile, FileStore, StackState)> {
    let stackfile = Stackfile::load(&ctx.stackfile_path)?;
    let store = FileStore::new(&ctx.state_dir);
    let state = store
        .load(&stackfile.stack.name)
        .with_context(|| format!("failed to load state for stack '{}'", stackfile.stack.name))?;
    Ok((stackfile, store, state))
}

/// Register a provider for every type tag the stackfile or the recorded
/// state mentions; deletes need providers for types no longer declared.
pub fn providers_for(ctx: &Context, stackfile: &Stackfile, state: &StackState) -> ProviderSet {
    let mut tags: BTreeSet<String> = stackfile.type_tags();
    tags.extend(
        state
            .resources
            .values()
            .map(|record| record.resource_type.clone()),
    );

    let mut providers = ProviderSet::new();
    for tag in tags {
        providers.register(
            tag.clone(),
            Box::new(LocalProvider::new(tag, &ctx.objects_dir)),
        );
    }
    providers
}
