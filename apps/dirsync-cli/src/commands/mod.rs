//! Subcommands.

pub mod import;
pub mod servers;
pub mod test_connection;
