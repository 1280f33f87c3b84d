pub mod api;
pub mod caps;
pub mod config;
pub mod context;
pub mod status;

pub use caps::{CapSet, Capability};
pub use config::Configuration;
pub use context::{AuthToken, Context};
pub use status::{Code, Status};
