use anyhow::Result;

use schema_engine_core::validation::validate;
use schema_engine_storage::ddl;

use crate::cli::DdlArgs;
use crate::context::{load_definition, RuntimeContext};
use crate::output::print_ddl_statements;

pub fn run(ctx: &RuntimeContext, args: &DdlArgs) -> Result<()> {
    let definition = load_definition(&args.file)?;

    let report = validate(&definition);
    if !report.ok() {
        anyhow::bail!(
            "refusing to emit DDL for an invalid definition ({} error(s)); run `sle validate` first",
            report.errors.len()
        );
    }

    let statements = ddl::emit_create(&definition)?;
    print_ddl_statements(&statements, ctx.json);
    Ok(())
}
