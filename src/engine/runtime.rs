use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::errors::DastError;

/// Where a started engine can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEndpoint {
    pub api_url: Url,
    /// Ephemeral directory shared with the engine, removed on release.
    pub workspace: Option<PathBuf>,
}

/// Provides the engine process for one scan and tears it down again.
#[async_trait]
pub trait EngineRuntime: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<EngineEndpoint, DastError>;

    /// Must tolerate being called for an engine that is already gone.
    async fn stop(&self) -> Result<(), DastError>;
}

/// An engine someone else runs. Starting only reports its URL and stopping
/// leaves it alone.
#[derive(Debug, Clone)]
pub struct ExternalRuntime {
    api_url: Url,
}

impl ExternalRuntime {
    pub fn new(api_url: Url) -> Self {
        Self { api_url }
    }
}

#[async_trait]
impl EngineRuntime for ExternalRuntime {
    fn name(&self) -> &str {
        "external"
    }

    async fn start(&self) -> Result<EngineEndpoint, DastError> {
        info!(api_url = %self.api_url, "Using externally managed scan engine");
        Ok(EngineEndpoint { api_url: self.api_url.clone(), workspace: None })
    }

    async fn stop(&self) -> Result<(), DastError> {
        Ok(())
    }
}
