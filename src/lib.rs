//! golem-build - distributed C/C++ compilation over a Golem peer grid
//!
//! Compilation units are preprocessed locally, packed into content-addressed
//! bundles and executed on remote peers discovered through a hub. Peers pull
//! bundles from the local delivery endpoint and push result archives back.

pub mod bundle;
pub mod cache;
pub mod config;
pub mod delivery;
pub mod hub;
pub mod mock;
pub mod scheduler;
pub mod service;
pub mod signal;
pub mod task;
pub mod worker;

pub use cache::PackageCache;
pub use config::{ConfigError, ConfigOverrides, ServiceConfig};
pub use delivery::{DeliveryServer, DeliveryUrls};
pub use hub::{HttpHub, HubApi, HubError};
pub use scheduler::{BuildEvent, BuildTaskStatus, Scheduler, SchedulerConfig};
pub use service::{BuildService, ServiceError};
pub use task::CompilationTask;
pub use worker::{BatchOutcome, DispatchContext, SessionSlot, Worker};
