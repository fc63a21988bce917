//! Local index engine contract
//!
//! The content and filename backends only talk to an index through
//! [`IndexEngine`] and to the line matcher through [`Grep`]. [`TrigramIndex`]
//! is the bundled engine, stored as a JSON artifact.

mod grep;
mod trigram;

pub use grep::{Grep, LineFormat};
pub use trigram::TrigramIndex;

use crate::error::Result;
use regex::Regex;

/// Identifier of a file inside an index
pub type FileId = u32;

/// What a prebuilt index answers
pub trait IndexEngine {
    /// Indexed root directories
    fn roots(&self) -> &[String];

    /// Full path of a file
    fn name(&self, id: FileId) -> Option<&str>;

    /// Candidate files that may contain a match for `re`, in index order.
    /// May over-approximate, never under-approximates.
    fn posting_query(&self, re: &Regex) -> Result<Vec<FileId>>;
}
