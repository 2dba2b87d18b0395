//! `converge apply` - converge physical resources to the declared state.

use super::{Context, load_stack, providers_for};
use crate::cli::ApplyArgs;
use crate::progress::ApplyProgress;
use crate::{render, ui};
use anyhow::{Context as AnyhowContext, Result, bail};
use dialoguer::Confirm;
use reconcile::{ExecuteOptions, Plan, ProviderSet, StackState, StateStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let (stackfile, store, mut state) = load_stack(ctx)?;
    let providers = providers_for(ctx, &stackfile, &state);

    let plan = reconcile::plan(&stackfile.declarations(), &state, &providers)?;
    render::render_plan(&plan, &state, ctx.verbose > 0);

    if !plan.has_changes() {
        return Ok(());
    }
    if args.dry_run {
        println!();
        ui::info("Dry run - no changes made");
        return Ok(());
    }
    if !args.yes && !confirm_proceed()? {
        println!();
        ui::error("Aborted");
        return Ok(());
    }

    let report = converge(plan, &providers, &mut state, args.jobs, args.timeout, ctx.quiet)?;

    store.save(&stackfile.stack.name, &state)?;
    render::render_report(&report);

    if !stackfile.outputs.is_empty() && report.is_success() {
        let outputs = reconcile::resolve_outputs(&stackfile.outputs, &state);
        render::render_outputs(&outputs, false)?;
    }

    let summary = report.summary();
    if !summary.is_success() {
        bail!("apply finished with {} failed resource(s)", summary.failed);
    }
    Ok(())
}

/// Execute the plan with interrupt handling; the state reflects whatever
/// completed even when the run is cancelled or fails.
pub(super) fn converge(
    plan: Plan,
    providers: &ProviderSet,
    state: &mut StackState,
    jobs: usize,
    timeout_secs: u64,
    quiet: bool,
) -> Result<reconcile::RunReport> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        eprintln!("\ninterrupt received; letting in-flight operations finish");
    })
    .context("failed to install interrupt handler")?;

    let opts = ExecuteOptions {
        jobs,
        op_timeout: Duration::from_secs(timeout_secs),
    };
    let mut progress = if quiet {
        ApplyProgress::hidden()
    } else {
        ApplyProgress::new(plan.change_count())
    };

    let report = reconcile::execute(plan, providers, state, &opts, &mut progress, &cancel)?;
    Ok(report)
}

fn confirm_proceed() -> Result<bool> {
    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;
    Ok(confirmed)
}
