//! `sle` -- schema lifecycle engine driver.
//!
//! This is the entry point for the CLI. It parses arguments with clap and
//! dispatches to one handler per subsystem being demonstrated.

mod cli;
mod commands;
mod context;
mod output;

use clap::Parser;

use cli::{Cli, Commands};
use context::RuntimeContext;

fn main() {
    let cli = Cli::parse();

    let ctx = RuntimeContext::from_global_args(&cli.global);

    if ctx.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("sle=debug")
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match &cli.command {
        Some(Commands::Validate(args)) => commands::validate::run(&ctx, args),
        Some(Commands::Ddl(args)) => commands::ddl::run(&ctx, args),
        Some(Commands::Diff(args)) => commands::diff::run(&ctx, args),
        Some(Commands::Order(args)) => commands::order::run(&ctx, args),
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        if cli.global.json {
            let err_json = serde_json::json!({ "error": format!("{:#}", e) });
            if let Ok(s) = serde_json::to_string_pretty(&err_json) {
                eprintln!("{}", s);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}
