//! `converge destroy` - delete every resource recorded for the stack.
//!
//! Destroying is reconciling against an empty desired graph: the planner
//! schedules one delete per recorded resource, dependents first.

use super::{Context, apply, load_stack, providers_for};
use crate::cli::DestroyArgs;
use crate::{render, ui};
use anyhow::{Result, bail};
use dialoguer::Confirm;
use reconcile::StateStore;

pub fn run(ctx: &Context, args: &DestroyArgs) -> Result<()> {
    let (stackfile, store, mut state) = load_stack(ctx)?;
    let providers = providers_for(ctx, &stackfile, &state);

    if state.is_empty() {
        ui::info("Nothing recorded for this stack");
        return Ok(());
    }

    let plan = reconcile::plan(&[], &state, &providers)?;
    render::render_plan(&plan, &state, ctx.verbose > 0);

    let count = state.resources.len();
    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Destroy all {count} recorded resource(s)?"))
            .default(false)
            .interact()?;
        if !confirmed {
            println!();
            ui::error("Aborted");
            return Ok(());
        }
    }

    let report = apply::converge(
        plan,
        &providers,
        &mut state,
        args.jobs,
        args.timeout,
        ctx.quiet,
    )?;

    store.save(&stackfile.stack.name, &state)?;
    render::render_report(&report);

    let summary = report.summary();
    if !summary.is_success() {
        bail!("destroy finished with {} failed resource(s)", summary.failed);
    }
    Ok(())
}
