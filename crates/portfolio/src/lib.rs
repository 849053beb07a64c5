//! Storage shell of the portfolio backend.
//!
//! Hosts the `RecordStore` backends, the content and counter repositories
//! built on them, and environment configuration.

pub mod config;
pub mod repository;
pub mod storage;
