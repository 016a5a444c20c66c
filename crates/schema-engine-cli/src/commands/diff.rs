use anyhow::Result;

use schema_engine_core::diff::diff;

use crate::cli::DiffArgs;
use crate::context::{load_definition, RuntimeContext};
use crate::output::print_changes;

pub fn run(ctx: &RuntimeContext, args: &DiffArgs) -> Result<()> {
    let from = load_definition(&args.from)?;
    let to = load_definition(&args.to)?;

    let changes = diff(&from, &to)?;
    let breaking = changes.iter().filter(|c| c.is_breaking()).count();
    print_changes(&changes, ctx.json);

    if breaking > 0 && !ctx.json && !ctx.quiet {
        println!("\n{breaking} breaking change(s)");
    }
    Ok(())
}
