//! Container lifecycle engine for a single Stevedore node.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod container;
pub mod engine;
pub mod events;
pub mod health;
pub mod logs;
pub mod metrics;
pub mod recovery;
pub mod spec;
pub mod state;
pub mod stop;
mod supervisor;

pub use engine::{Engine, SampleCallback, StatusCallback};
