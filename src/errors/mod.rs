pub mod types;
pub mod classification;
pub mod retry;

pub use types::DastError;
pub use classification::{ErrorClassification, FailureKind};
pub use retry::{poll_until, with_retry, GiveUpReason, PollOutcome, PollPolicy, PollStep, RetryConfig};
