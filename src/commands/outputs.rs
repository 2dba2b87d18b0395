//! `converge outputs` - print stack outputs from recorded state.

use super::{Context, load_stack};
use crate::cli::OutputsArgs;
use crate::{render, ui};
use anyhow::Result;

pub fn run(ctx: &Context, args: &OutputsArgs) -> Result<()> {
    let (stackfile, _store, state) = load_stack(ctx)?;

    if stackfile.outputs.is_empty() {
        if !args.json {
            ui::info("Stack declares no outputs");
        } else {
            println!("{{}}");
        }
        return Ok(());
    }

    let outputs = reconcile::resolve_outputs(&stackfile.outputs, &state);
    render::render_outputs(&outputs, args.json)
}
