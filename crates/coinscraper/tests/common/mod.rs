//! Shared test utilities for coinscraper integration tests.
//!
//! This module provides:
//! - `TestHarness`, a running service over a database in a temp directory
//! - Scripted `ScrapeCapability` fakes with call counters

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::{fast_settings, wait_for_tasks, TestHarness};
