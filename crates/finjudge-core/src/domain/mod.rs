//! Domain models for finjudge.
//!
//! - `error`: `JudgeError` / `ValidationError` and the retry policy
//! - `status`: derived entry lifecycle and the `RoundSnapshot` view

pub mod error;
pub mod status;

pub use error::{JudgeError, Result, ValidationError};
pub use status::{
    count_unassigned, entry_status, EntryStatus, RoundSnapshot, RoundSummary, StatusCounts,
};
