pub mod finding;
pub mod report;
pub mod document;
pub mod verdict;

pub use finding::*;
pub use report::*;
pub use document::*;
pub use verdict::*;
