pub mod config;
pub mod config_loader;
pub mod error;
pub mod state_machine;
pub mod types;

pub use config::*;
pub use config_loader::{ConfigLoadOptions, ConfigLoader};
pub use error::*;
pub use state_machine::*;
pub use types::*;
