//! streamsnap: a streaming server-side render server that snapshots static
//! routes into a storage backend.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
