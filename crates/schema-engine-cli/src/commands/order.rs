use std::collections::HashMap;

use anyhow::Result;

use schema_engine_core::graph::execution_order;

use crate::cli::OrderArgs;
use crate::context::{load_definition, RuntimeContext};
use crate::output::print_execution_order;

/// Resolves each loaded definition's `database.foreignKey`/`relationship`
/// references against the other definitions in the same invocation
/// (matched by `model_id`, the same convention the storage layer's
/// dependency derivation uses) and prints the order in which they must be
/// created so every referent exists first.
pub fn run(ctx: &RuntimeContext, args: &OrderArgs) -> Result<()> {
    let definitions: Vec<_> =
        args.files.iter().map(|path| load_definition(path)).collect::<Result<_>>()?;

    let model_id_of: HashMap<i64, String> =
        definitions.iter().enumerate().map(|(i, def)| (i as i64, def.model_id.clone())).collect();
    let id_of: HashMap<&str, i64> =
        definitions.iter().enumerate().map(|(i, def)| (def.model_id.as_str(), i as i64)).collect();

    let ids: Vec<i64> = (0..definitions.len() as i64).collect();
    let mut edges: Vec<(i64, i64)> = Vec::new();
    let mut unresolved: Vec<String> = Vec::new();

    for (i, def) in definitions.iter().enumerate() {
        let from = i as i64;
        for (_, field) in def.fields_in_order() {
            if let Some(db) = &field.database {
                if let Some(fk) = &db.foreign_key {
                    match id_of.get(fk.table.as_str()) {
                        Some(&to) => edges.push((from, to)),
                        None => unresolved.push(format!("{} -> {} (foreign key)", def.model_id, fk.table)),
                    }
                }
            }
            if let Some(rel) = &field.relationship {
                match id_of.get(rel.model.as_str()) {
                    Some(&to) => edges.push((from, to)),
                    None => unresolved.push(format!("{} -> {} (relationship)", def.model_id, rel.model)),
                }
            }
        }
    }

    let order = execution_order(&ids, &edges, &model_id_of).map_err(|e| {
        let mut residual: Vec<String> = e.0.iter().filter_map(|id| model_id_of.get(id).cloned()).collect();
        residual.sort();
        anyhow::anyhow!("circular dependency among: {}", residual.join(", "))
    })?;

    let ordered_model_ids: Vec<String> = order.iter().map(|id| model_id_of[id].clone()).collect();
    print_execution_order(&ordered_model_ids, ctx.json);

    if !unresolved.is_empty() && !ctx.quiet {
        eprintln!("\n{} unresolved reference(s) outside this file set:", unresolved.len());
        for u in &unresolved {
            eprintln!("  - {u}");
        }
    }
    Ok(())
}
