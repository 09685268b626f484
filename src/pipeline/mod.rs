//! Email lookup pipeline — relevance classification, ranking, and detail
//! extraction over the user's mailbox.

pub mod details;
pub mod lookup;
pub mod types;

pub use details::DetailExtractor;
pub use lookup::LookupPipeline;
pub use types::{EmailDetails, LookupOutcome, RankedChoice};
