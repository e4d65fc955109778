//! CLI command implementations

pub mod error;
pub mod lookup;

pub use error::CliError;
pub use lookup::{BulkArgs, Cli, Commands, LookupArgs, OutputFormat};
