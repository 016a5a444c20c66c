//! Clap CLI definitions for the `sle` command.
//!
//! A thin driver over the library crates: one subcommand per subsystem
//! (Schema Validator, DDL Generator, Diff Engine, Dependency Resolver),
//! reading schema definitions straight off disk rather than through a
//! persisted store.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// sle -- schema lifecycle engine driver.
#[derive(Parser, Debug)]
#[command(
    name = "sle",
    about = "Schema lifecycle engine driver",
    long_about = "Validates schema definitions, emits DDL, diffs versions, and orders them by dependency -- a thin command-line harness over the schema lifecycle engine library.",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Global flags available to all subcommands.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Output in JSON format.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose/debug output.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output (errors only).
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

/// All available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a schema definition file against the lifecycle invariants.
    Validate(ValidateArgs),

    /// Emit ordered CREATE TABLE DDL for a schema definition file.
    Ddl(DdlArgs),

    /// Diff two versions of a schema definition and list the changes.
    Diff(DiffArgs),

    /// Topologically order a set of schema definition files by their
    /// declared foreign keys and relationships.
    Order(OrderArgs),
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to a schema definition file (`.json`, `.yaml`, or `.yml`).
    pub file: PathBuf,

    /// Stop at the first validation error instead of collecting every one.
    #[arg(long)]
    pub fast: bool,
}

#[derive(Args, Debug)]
pub struct DdlArgs {
    /// Path to a schema definition file (`.json`, `.yaml`, or `.yml`).
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Path to the prior version's definition file.
    pub from: PathBuf,

    /// Path to the new version's definition file.
    pub to: PathBuf,
}

#[derive(Args, Debug)]
pub struct OrderArgs {
    /// Paths to the schema definition files to order. A foreign key or
    /// relationship pointing outside this set is reported, not resolved.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}
