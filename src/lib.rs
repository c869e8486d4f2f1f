//! Shares agent: automated buy/sell engine for on-chain social-token shares.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod data;
pub mod engine;
pub mod platforms;
pub mod retry;
pub mod strategy;
pub mod types;
