use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::errors::DastError;
use crate::models::report::RawReport;
use crate::pipeline::phase::{JobId, PhaseKind, PhaseProgress, PhaseRequest};

/// Opaque engine-side context handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(pub String);

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request/response contract of the remote scanning engine.
#[async_trait]
pub trait ScanEngine: Send + Sync {
    /// Lightweight health check.
    async fn version(&self) -> Result<String, DastError>;

    async fn find_context(&self, name: &str) -> Result<Option<ContextId>, DastError>;

    async fn create_context(&self, name: &str) -> Result<ContextId, DastError>;

    async fn include_in_context(&self, context_name: &str, regex: &str) -> Result<(), DastError>;

    async fn set_form_authentication(
        &self,
        context: &ContextId,
        login_url: &str,
        login_request_data: &str,
    ) -> Result<(), DastError>;

    /// Create an enabled scan user with the given credentials; returns its id.
    async fn create_user(
        &self,
        context: &ContextId,
        name: &str,
        username: &str,
        password: &str,
    ) -> Result<String, DastError>;

    async fn set_forced_user(&self, context: &ContextId, user_id: &str) -> Result<(), DastError>;

    /// Add or replace a header on outgoing requests whose URL matches
    /// `url_regex`. Requests to other hosts are left untouched.
    async fn add_request_header(
        &self,
        description: &str,
        header: &str,
        value: &str,
        url_regex: &str,
    ) -> Result<(), DastError>;

    async fn start_phase(&self, kind: PhaseKind, request: &PhaseRequest) -> Result<JobId, DastError>;

    async fn phase_progress(&self, kind: PhaseKind, job: &JobId) -> Result<PhaseProgress, DastError>;

    async fn stop_phase(&self, kind: PhaseKind, job: &JobId) -> Result<(), DastError>;

    async fn report(&self) -> Result<RawReport, DastError>;
}
