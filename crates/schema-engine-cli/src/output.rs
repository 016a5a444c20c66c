//! Output formatting for the `sle` CLI.
//!
//! Every command produces either a human-readable rendering or, with
//! `--json`, a `serde_json::Value` printed via `to_string_pretty`.

use schema_engine_core::diff::Change;
use schema_engine_core::validation::ValidationReport;

/// Renders a [`ValidationReport`], human or JSON.
pub fn print_validation_report(report: &ValidationReport, json: bool) {
    if json {
        let errors: Vec<String> = report.errors.iter().map(|e| e.to_string()).collect();
        let value = serde_json::json!({ "ok": report.ok(), "errors": errors });
        println!("{}", serde_json::to_string_pretty(&value).expect("value is always serializable"));
        return;
    }

    if report.ok() {
        println!("OK: no validation errors");
        return;
    }
    println!("FAILED: {} error(s)", report.errors.len());
    for error in &report.errors {
        println!("  - {error}");
    }
}

/// Renders ordered DDL statements, human or JSON.
pub fn print_ddl_statements(statements: &[String], json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(statements).expect("value is always serializable"));
        return;
    }
    for statement in statements {
        println!("{statement}");
    }
}

/// Renders a list of [`Change`]s, human or JSON.
pub fn print_changes(changes: &[Change], json: bool) {
    if json {
        let value = serde_json::to_value(changes).unwrap_or(serde_json::Value::Null);
        println!("{}", serde_json::to_string_pretty(&value).expect("value is always serializable"));
        return;
    }
    if changes.is_empty() {
        println!("No changes detected");
        return;
    }
    for change in changes {
        let marker = if change.is_breaking() { "!" } else { " " };
        println!("{marker} {change:?}");
    }
}

/// Renders a topological order of model ids, human or JSON.
pub fn print_execution_order(order: &[String], json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(order).expect("value is always serializable"));
        return;
    }
    for (position, model_id) in order.iter().enumerate() {
        println!("{}. {model_id}", position + 1);
    }
}
