//! Mock hub implementation
//!
//! An in-process [`crate::hub::HubApi`] for unit and integration tests:
//!
//! - configurable peers and core counts
//! - scripted exec output, queued or default
//! - exec gating to hold dispatches in flight
//! - per-operation failure injection (error, delay, panic, fail count)
//! - recording of deployments and commands for assertions

mod failure;
mod hub;

pub use failure::{FailureConfig, FailureInjector, HubOperation};
pub use hub::{MockHub, RecordedDeployment, RecordedUpdate};
