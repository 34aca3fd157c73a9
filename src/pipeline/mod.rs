pub mod controller;
pub mod events;
pub mod orchestrator;
pub mod phase;
pub mod runner;

pub use controller::PhaseController;
pub use events::PipelineEvent;
pub use orchestrator::{ScanOrchestrator, ScanOutcome};
pub use phase::{PhaseKind, PhaseStatus, ScanPhase, PHASES};
pub use runner::{run_scan, ScanRun};
