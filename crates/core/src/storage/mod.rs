mod cursor;
mod error;
pub mod keys;
mod traits;
mod types;

pub use cursor::{
    decode_token, encode_token, merge_pages, MergedCursor, StartKey, StreamCursor, StreamPage,
};
pub use error::{RepositoryError, Result};
pub use traits::RecordStore;
pub use types::{
    compare_values, lookup, Action, Attributes, Condition, KeyCondition, Mutation, Page, Query,
    Record, RecordKey, SortCondition, SortOrder, Target, UpdateOutcome,
};
