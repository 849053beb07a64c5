//! DynamoDB storage backend.
//!
//! This module provides a DynamoDB implementation of the `RecordStore` trait
//! over a single table with one global secondary index (`GSI1`).
//!
//! # Table layout
//!
//! | Record | PK | SK | GSI1PK | GSI1SK |
//! |--------|----|----|--------|--------|
//! | Content | `<KIND>#<id>` | `METADATA` | `<KIND>#STATUS#<status>` | `<KIND>#<timestamp>` |
//! | Category | `POST#CATEGORY#<name>` | `COUNT` | `POST#CATEGORY` | `<name>` |
//! | Views | `ANALYTICS#<KIND>#<id>` | `VIEWS` | `ANALYTICS#<KIND>` | `ANALYTICS#VIEWS#<n:010>` |
//! | Daily visitors | `VISITOR#DAILY#<date>` | `COUNT` | `VISITOR#DAILY` | `<date>` |
//! | Session marker | `SESSION#<session>` | `VIEW#<KIND>#<id>` or `VISIT` | - | - |
//!
//! Session markers carry `ExpiresAt` (epoch seconds), the table's TTL attribute.

mod conversions;
mod error;
mod expressions;
mod store;

pub use store::DynamoDbStore;
