//! One module per subcommand, dispatched from `main`.

pub mod ddl;
pub mod diff;
pub mod order;
pub mod validate;
