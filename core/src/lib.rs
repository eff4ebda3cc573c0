//! # bidi core
//!
//! The probing engine: spoofed TCP segment sequences, transmitters for the two
//! send paths, the probe types, the worker pool that fans targets across
//! them and the capture side that watches for replies.

pub mod capture;
pub mod error;
pub mod network;
pub mod pool;
pub mod probe;
