//! TRENDFEED: GitHub trending harvester.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod extract;
pub mod fetch;
pub mod llm;
pub mod engine;
pub mod storage;
