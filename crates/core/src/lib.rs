pub mod config;
pub mod drone;
pub mod types;

pub use config::{Config, ConfigError, WebConfig};
pub use drone::{Drone, DroneError, Rebuilder};
pub use types::{Build, BuildKind, JsonResponse};
