mod archive;
mod exec;
mod properties;

pub use archive::{contains_entry, Archive};
pub use exec::{Command, CommandExecutor, Execute, ExecutionError, ExecutionResult};
pub use properties::parse_properties;
