// src/lib.rs
// Public library surface for the binary and integration tests.

// Scoring core
pub mod config;
pub mod contribution;
pub mod decay;
pub mod engine;
pub mod event;
pub mod smoothing;
pub mod store;

// Distribution and wiring
pub mod hub;
pub mod intake;
pub mod runtime;
pub mod service;

// Signal acquisition
pub mod classify;
pub mod producers;

// Transport
pub mod api;
pub mod metrics;

pub use crate::api::create_router;
pub use crate::config::ScoreConfig;
pub use crate::engine::ScoreEngine;
pub use crate::event::{EventMeta, RiskEvent, ScoreState};
pub use crate::intake::EventRouter;
pub use crate::runtime::Runtime;
