//! Shared building blocks for the `bidi` probe engine.
//!
//! * [`config`]: run-wide settings handed from the CLI to the engine.
//! * [`network`]: probe targets and outgoing route resolution.
//! * [`utils`]: small helpers over `pnet` interface types.

pub mod config;
pub mod network;
pub mod utils;
