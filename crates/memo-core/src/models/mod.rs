//! Data models for study memos.
//!
//! Defines the catalog shapes observed from the remote server and the
//! outcome types returned to callers. The memo record itself lives in the
//! `memo-storage` crate and is re-exported here.

mod catalog;
mod outcome;

pub use catalog::*;
pub use memo_storage::MemoRecord;
pub use outcome::*;
