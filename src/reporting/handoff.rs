use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::errors::DastError;
use crate::models::{FindingsDocument, RawReport};

pub const FINDINGS_FILE: &str = "findings.json";
pub const ENGINE_REPORT_FILE: &str = "engine-report.json";

/// Downstream consumer of the canonical findings document (report
/// renderers, vulnerability-management uploaders).
#[async_trait]
pub trait ResultSink: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, document: &FindingsDocument, raw: &RawReport) -> Result<(), DastError>;
}

/// Writes the findings document and the engine report, every engine field
/// included, as JSON.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ResultSink for JsonFileSink {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn publish(&self, document: &FindingsDocument, raw: &RawReport) -> Result<(), DastError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let findings_path = self.dir.join(FINDINGS_FILE);
        tokio::fs::write(&findings_path, serde_json::to_string_pretty(document)?).await?;
        info!(path = %findings_path.display(), count = document.findings.len(), "Wrote findings document");

        let report_path = self.dir.join(ENGINE_REPORT_FILE);
        tokio::fs::write(&report_path, serde_json::to_string_pretty(raw)?).await?;
        info!(path = %report_path.display(), "Wrote engine report");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FindingsSummary, PolicyVerdict, ScanMetadata};
    use crate::session::AuthMethod;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn document() -> FindingsDocument {
        FindingsDocument {
            findings: Vec::new(),
            verdict: PolicyVerdict { passed: true, violations: Vec::new(), counts_by_severity: BTreeMap::new() },
            scan_metadata: ScanMetadata {
                scan_id: "scan-1".into(),
                target: "https://app.example.com/".into(),
                auth_method: AuthMethod::None,
                started_at: Utc::now(),
                finished_at: Utc::now(),
                phases: Vec::new(),
                engine_version: Some("2.15.0".into()),
                scanner_version: "1.0.0".into(),
            },
            summary: FindingsSummary::from_findings(&[]),
        }
    }

    #[tokio::test]
    async fn test_json_sink_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("nested"));
        sink.publish(&document(), &RawReport::default()).await.unwrap();

        let written = std::fs::read_to_string(sink.dir().join(FINDINGS_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["scan_metadata"]["scan_id"], "scan-1");
        assert_eq!(value["verdict"]["passed"], true);
        assert!(sink.dir().join(ENGINE_REPORT_FILE).exists());
    }

    #[tokio::test]
    async fn test_engine_report_keeps_unmodeled_fields() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path());
        let raw: RawReport = serde_json::from_str(
            r#"{"@version": "2.15.0", "site": [{"@name": "https://a", "@port": "443", "alerts": [{"alert": "X", "riskcode": "2"}]}]}"#,
        )
        .unwrap();
        sink.publish(&document(), &raw).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join(ENGINE_REPORT_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["site"][0]["@port"], "443");
        assert_eq!(value["site"][0]["alerts"][0]["riskcode"], "2");
    }
}
