//! Infrastructure adapters and runtime bootstrap.

pub mod artifacts;
pub mod dev;
pub mod error;
pub mod http;
pub mod storage;
pub mod telemetry;
