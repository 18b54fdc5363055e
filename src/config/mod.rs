mod loader;
mod types;

pub use loader::{load_config, parse_config, validate_hosts, validate_limits};
pub use types::*;
