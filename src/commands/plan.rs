//! `converge plan` - preview what apply would change.

use super::{Context, load_stack, providers_for};
use crate::render;
use anyhow::Result;

pub fn run(ctx: &Context) -> Result<()> {
    let (stackfile, _store, state) = load_stack(ctx)?;
    let providers = providers_for(ctx, &stackfile, &state);

    let plan = reconcile::plan(&stackfile.declarations(), &state, &providers)?;
    render::render_plan(&plan, &state, ctx.verbose > 0);
    Ok(())
}
