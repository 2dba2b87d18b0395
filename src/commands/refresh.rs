//! `converge refresh` - compare recorded state against physical resources.
//!
//! Findings are reported, not fixed: drift means someone changed the world
//! outside this tool, and resolving it is a human decision (edit the
//! declarations or re-apply).

use super::{Context, load_stack, providers_for};
use crate::ui;
use anyhow::Result;
use std::time::Duration;

const READ_TIMEOUT: Duration = Duration::from_secs(30);

pub fn run(ctx: &Context) -> Result<()> {
    let (stackfile, _store, state) = load_stack(ctx)?;
    let providers = providers_for(ctx, &stackfile, &state);

    if state.is_empty() {
        ui::info("Nothing recorded for this stack");
        return Ok(());
    }

    let findings = reconcile::detect_drift(&state, &providers, READ_TIMEOUT);
    if findings.is_empty() {
        ui::success(&format!(
            "All {} recorded resource(s) match their physical state",
            state.resources.len()
        ));
        return Ok(());
    }

    for finding in &findings {
        ui::warn(&format!("{}: {}", finding.name, finding.error));
    }
    println!();
    ui::warn(&format!(
        "{} resource(s) have drifted; re-run apply to converge or update the declarations",
        findings.len()
    ));
    Ok(())
}
