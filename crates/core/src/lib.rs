//! Functional core for the portfolio single-table store.
//!
//! Everything in this crate is pure: key derivation, the record model,
//! conditions and mutations, cursor merging, content derivations and trend
//! windows. The backends and repositories that perform I/O live in the
//! `portfolio` crate and depend on the [`storage::RecordStore`] trait defined
//! here.

pub mod analytics;
pub mod clock;
pub mod content;
pub mod storage;
