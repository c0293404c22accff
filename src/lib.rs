#![forbid(unsafe_code)]

//! Batch media acquisition on top of an external extraction engine.
//!
//! The crate resolves profile URLs into collection handles, lists the items of
//! a collection through the engine's metadata mode, plans where each file
//! lands on disk, and drives one sequential download per item while keeping a
//! per-batch success/failure ledger.

pub mod config;
pub mod engine;
pub mod enumerator;
pub mod error;
pub mod fallback;
pub mod model;
pub mod orchestrator;
pub mod planner;
pub mod progress;
pub mod report;
pub mod resolver;
pub mod runner;
pub mod sources;
