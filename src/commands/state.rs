//! `converge state` - show the recorded stack state.

use super::{Context, load_stack};
use crate::ui;
use anyhow::Result;
use colored::Colorize;

pub fn run(ctx: &Context) -> Result<()> {
    let (stackfile, _store, state) = load_stack(ctx)?;

    ui::header(&format!("Stack '{}'", stackfile.stack.name));
    ui::kv("serial", &state.serial.to_string());
    ui::kv("updated", &state.last_updated.to_rfc3339());

    if state.is_empty() {
        println!();
        ui::dim("no resources recorded");
        return Ok(());
    }

    ui::section("Resources");
    for (name, record) in &state.resources {
        println!(
            "  {} {}",
            name.bold(),
            format!("({})", record.resource_type).dimmed()
        );
        if let Some(id) = &record.physical_id {
            ui::kv("  id", id);
        }
        ui::kv("  updated", &record.updated_at.to_rfc3339());
        if !record.dependencies.is_empty() {
            let deps: Vec<&str> = record.dependencies.iter().map(String::as_str).collect();
            ui::kv("  depends on", &deps.join(", "));
        }
        if ctx.verbose > 0 {
            for (key, value) in &record.attributes {
                ui::kv(&format!("  {key}"), &value.to_string());
            }
        }
    }
    Ok(())
}
