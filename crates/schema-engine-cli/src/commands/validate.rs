use anyhow::Result;

use schema_engine_core::validation::{validate, validate_fast, ValidationReport};

use crate::cli::ValidateArgs;
use crate::context::{load_definition, RuntimeContext};
use crate::output::print_validation_report;

pub fn run(ctx: &RuntimeContext, args: &ValidateArgs) -> Result<()> {
    let definition = load_definition(&args.file)?;

    let report = if args.fast {
        match validate_fast(&definition) {
            Ok(()) => ValidationReport { errors: Vec::new() },
            Err(e) => ValidationReport { errors: vec![e] },
        }
    } else {
        validate(&definition)
    };

    let ok = report.ok();
    print_validation_report(&report, ctx.json);

    if !ok {
        anyhow::bail!("validation failed with {} error(s)", report.errors.len());
    }
    Ok(())
}
