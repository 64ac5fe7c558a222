//! buildcache - build cache for CI pipelines
//!
//! A restore phase fetches the best matching cached tree before the build;
//! a save phase stores the tree afterwards unless the primary key already
//! hit exactly.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod orchestration;
pub mod state;
pub mod storage;

pub use error::{BuildCacheError, BuildCacheResult};
