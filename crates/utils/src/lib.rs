pub mod env;
pub mod route_config;

pub use env::{env_or, env_or_filtered};
pub use route_config::{RouteConfigSource, RouteConfigDoc, RouteConfigError};
