pub mod api;
pub mod zap;
pub mod scripted;
pub mod runtime;
pub mod lifecycle;

pub use api::{ContextId, ScanEngine};
pub use zap::ZapClient;
pub use scripted::ScriptedEngine;
pub use runtime::{EngineEndpoint, EngineRuntime, ExternalRuntime};
pub use lifecycle::{EngineGuard, EngineManager};
