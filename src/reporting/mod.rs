pub mod categories;
pub mod formatter;
pub mod handoff;
pub mod normalizer;

pub use handoff::{JsonFileSink, ResultSink};
pub use normalizer::normalize;
