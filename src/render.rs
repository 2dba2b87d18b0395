//! Plan, report, and output rendering.

use crate::ui;
use colored::Colorize;
use reconcile::{
    OpKind, OpOutcome, OutputValue, Plan, PlannedOp, RunReport, StackState,
};
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeMap;

/// Display the plan grouped by resource type.
pub fn render_plan(plan: &Plan, state: &StackState, verbose: bool) {
    if !plan.has_changes() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    let mut by_type: BTreeMap<&str, Vec<&PlannedOp>> = BTreeMap::new();
    for op in &plan.ops {
        if op.kind.is_change() || verbose {
            by_type.entry(op.resource_type.as_str()).or_default().push(op);
        }
    }

    ui::header("Plan");
    for (resource_type, ops) in &by_type {
        println!("{}", resource_type.bold());
        for op in ops {
            let symbol = match op.kind {
                OpKind::Create => op.kind.symbol().green(),
                OpKind::Update | OpKind::Replace => op.kind.symbol().yellow(),
                OpKind::Delete => op.kind.symbol().red(),
                OpKind::NoOp => op.kind.symbol().dimmed(),
            };
            println!(
                "  {} {:<28} {}",
                symbol,
                op.name,
                op.kind.label().dimmed()
            );
            if verbose && matches!(op.kind, OpKind::Update | OpKind::Replace) {
                for line in property_diff(op, state) {
                    println!("      {line}");
                }
            }
        }
        println!();
    }

    for record in &plan.rejected {
        match &record.outcome {
            OpOutcome::Failed(error) => {
                println!("  {} {:<28} {}", "✗".red(), record.name, error);
            }
            OpOutcome::Skipped(reason) => {
                println!(
                    "  {} {:<28} {}",
                    "⊘".dimmed(),
                    record.name,
                    format!("skipped: {reason}").dimmed()
                );
            }
            OpOutcome::Done => {}
        }
    }
    if !plan.rejected.is_empty() {
        println!();
    }

    let creates = count(plan, OpKind::Create);
    let updates = count(plan, OpKind::Update);
    let replaces = count(plan, OpKind::Replace);
    let deletes = count(plan, OpKind::Delete);
    println!(
        "Plan: {} to create, {} to update, {} to replace, {} to delete",
        creates.to_string().green(),
        updates.to_string().yellow(),
        replaces.to_string().yellow(),
        deletes.to_string().red(),
    );
}

fn count(plan: &Plan, kind: OpKind) -> usize {
    plan.ops.iter().filter(|op| op.kind == kind).count()
}

/// Line diff between recorded and declared properties.
fn property_diff(op: &PlannedOp, state: &StackState) -> Vec<String> {
    let prior = state
        .get(&op.name)
        .map(|record| pretty(&record.properties))
        .unwrap_or_default();
    let desired = pretty(&op.properties);

    TextDiff::from_lines(&prior, &desired)
        .iter_all_changes()
        .filter_map(|change| match change.tag() {
            ChangeTag::Delete => {
                Some(format!("- {}", change.value().trim_end()).red().to_string())
            }
            ChangeTag::Insert => Some(
                format!("+ {}", change.value().trim_end())
                    .green()
                    .to_string(),
            ),
            ChangeTag::Equal => None,
        })
        .collect()
}

fn pretty(properties: &BTreeMap<String, serde_json::Value>) -> String {
    serde_json::to_string_pretty(properties).unwrap_or_default()
}

/// Display the per-resource results and the closing summary.
pub fn render_report(report: &RunReport) {
    let summary = report.summary();

    for record in &report.records {
        match &record.outcome {
            OpOutcome::Failed(error) => {
                ui::error(&format!("{}: {error}", record.name));
            }
            OpOutcome::Skipped(reason) => {
                ui::dim(&format!("⊘ {}: {reason}", record.name));
            }
            OpOutcome::Done => {}
        }
    }

    println!();
    if summary.is_success() {
        ui::success("Converged");
    } else {
        ui::warn("Converged with errors");
    }
    if summary.created > 0 {
        ui::dim(&format!("• {} created", summary.created));
    }
    if summary.updated > 0 {
        ui::dim(&format!("• {} updated", summary.updated));
    }
    if summary.replaced > 0 {
        ui::dim(&format!("• {} replaced", summary.replaced));
    }
    if summary.deleted > 0 {
        ui::dim(&format!("• {} deleted", summary.deleted));
    }
    if summary.unchanged > 0 {
        ui::dim(&format!("• {} unchanged", summary.unchanged));
    }
    if summary.skipped > 0 {
        ui::dim(&format!("• {} skipped", summary.skipped));
    }
    if summary.failed > 0 {
        ui::dim(&format!("• {} {}", summary.failed, "failed".red()));
    }
}

/// Display resolved outputs as a table or JSON object.
pub fn render_outputs(outputs: &[OutputValue], json: bool) -> anyhow::Result<()> {
    if json {
        let mut object = serde_json::Map::new();
        for output in outputs {
            match &output.value {
                Ok(value) => {
                    object.insert(output.name.clone(), value.clone());
                }
                Err(error) => anyhow::bail!("output '{}': {error}", output.name),
            }
        }
        println!("{}", serde_json::to_string_pretty(&object)?);
        return Ok(());
    }

    ui::section("Outputs");
    let mut failures = 0;
    for output in outputs {
        match &output.value {
            Ok(serde_json::Value::String(text)) => ui::kv(&output.name, text),
            Ok(value) => ui::kv(&output.name, &value.to_string()),
            Err(error) => {
                ui::error(&format!("{}: {error}", output.name));
                failures += 1;
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} output(s) could not be resolved");
    }
    Ok(())
}
