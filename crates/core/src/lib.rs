pub mod cache;
pub mod callback;
pub mod change_detector;
pub mod config;
pub mod error;
pub mod poller;
pub mod registry;
pub mod router_core;
pub mod selective_updater;

pub use cache::{CacheError, InMemoryResponseCache, RedisResponseCache, ResponseCache, SharedResponseCache};
pub use callback::CallbackSink;
pub use config::RouterConfig;
pub use error::RouterError;
pub use poller::StatusPoller;
pub use registry::{RouteRegistry, RouteRegistryError};
pub use router_core::RouterCore;
pub use selective_updater::{SelectiveUpdater, UpdateError, UpdateOutcome};
