//! Epoch trader: autonomous agent for on-chain prediction feeds.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod chain;
pub mod registry;
pub mod storage;
pub mod strategy;
pub mod engine;
