use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;
use super::api::{ContextId, ScanEngine};
use crate::errors::DastError;
use crate::models::report::RawReport;
use crate::pipeline::phase::{JobId, PhaseKind, PhaseProgress, PhaseRequest};
use tracing::debug;

/// Reported when the engine is up but does not say which version it runs.
pub const UNKNOWN_VERSION: &str = "unknown";

/// HTTP client for the engine's JSON control API. The API key is disabled
/// on the engine, so requests carry no credentials.
pub struct ZapClient {
    client: Client,
    base_url: Url,
}

impl ZapClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, DastError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| DastError::Config(format!("Invalid engine URL '{}': {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DastError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    async fn call(
        &self,
        component: &str,
        kind: &str,
        name: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, DastError> {
        let path = format!("JSON/{}/{}/{}/", component, kind, name);
        let url = self.base_url.join(&path)
            .map_err(|e| DastError::Internal(format!("Bad engine path {}: {}", path, e)))?;
        debug!(endpoint = %path, "Engine request");

        let resp = self.client.get(url).query(params).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(engine_error(status, &body, &path));
        }
        serde_json::from_str(&body)
            .map_err(|e| DastError::MalformedResponse(format!("{}: {}", path, e)))
    }

    async fn action_ok(
        &self,
        component: &str,
        name: &str,
        params: &[(&str, &str)],
    ) -> Result<(), DastError> {
        let value = self.call(component, "action", name, params).await?;
        match value.get("Result").and_then(Value::as_str) {
            Some("OK") => Ok(()),
            _ => Err(DastError::MalformedResponse(format!(
                "{}/{}: expected Result=OK, got {}",
                component, name, value
            ))),
        }
    }
}

fn engine_error(status: reqwest::StatusCode, body: &str, path: &str) -> DastError {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(code) = value.get("code").and_then(Value::as_str) {
            let message = value.get("message").and_then(Value::as_str).unwrap_or("");
            return DastError::Engine(format!("{} ({}): {} {}", path, status.as_u16(), code, message));
        }
    }
    if status.is_server_error() {
        DastError::Network(format!("{} returned HTTP {}", path, status.as_u16()))
    } else {
        DastError::Engine(format!("{} returned HTTP {}", path, status.as_u16()))
    }
}

/// Read a non-empty string field.
fn string_field<'a>(value: &'a Value, key: &str) -> Result<&'a str, DastError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DastError::MalformedResponse(format!("missing '{}' in {}", key, value)))
}

/// Context lists arrive either as a JSON array or as a bracketed string.
fn context_names(value: &Value) -> Vec<String> {
    match value.get("contextList") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        Some(Value::String(s)) => s
            .trim_matches(|c| c == '[' || c == ']')
            .split(',')
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn config_params(pairs: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

#[async_trait]
impl ScanEngine for ZapClient {
    async fn version(&self) -> Result<String, DastError> {
        // Any 2xx means the API is up, whatever the body says.
        let value = match self.call("core", "view", "version", &[]).await {
            Ok(value) => value,
            Err(DastError::MalformedResponse(reason)) => {
                debug!(%reason, "Engine answered without a readable version");
                Value::Null
            }
            Err(e) => return Err(e),
        };
        Ok(string_field(&value, "version").unwrap_or(UNKNOWN_VERSION).to_string())
    }

    async fn find_context(&self, name: &str) -> Result<Option<ContextId>, DastError> {
        let list = self.call("context", "view", "contextList", &[]).await?;
        if !context_names(&list).iter().any(|n| n == name) {
            return Ok(None);
        }
        let value = self.call("context", "view", "context", &[("contextName", name)]).await?;
        let id = value
            .get("context")
            .and_then(|c| c.get("id"))
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| DastError::MalformedResponse(format!("context '{}' has no id", name)))?;
        Ok(Some(ContextId(id)))
    }

    async fn create_context(&self, name: &str) -> Result<ContextId, DastError> {
        let value = self.call("context", "action", "newContext", &[("contextName", name)]).await?;
        Ok(ContextId(string_field(&value, "contextId")?.to_string()))
    }

    async fn include_in_context(&self, context_name: &str, regex: &str) -> Result<(), DastError> {
        self.action_ok("context", "includeInContext", &[("contextName", context_name), ("regex", regex)])
            .await
    }

    async fn set_form_authentication(
        &self,
        context: &ContextId,
        login_url: &str,
        login_request_data: &str,
    ) -> Result<(), DastError> {
        let params = config_params(&[("loginUrl", login_url), ("loginRequestData", login_request_data)]);
        self.action_ok(
            "authentication",
            "setAuthenticationMethod",
            &[
                ("contextId", context.0.as_str()),
                ("authMethodName", "formBasedAuthentication"),
                ("authMethodConfigParams", params.as_str()),
            ],
        )
        .await
    }

    async fn create_user(
        &self,
        context: &ContextId,
        name: &str,
        username: &str,
        password: &str,
    ) -> Result<String, DastError> {
        let value = self.call("users", "action", "newUser", &[("contextId", context.0.as_str()), ("name", name)]).await?;
        let user_id = string_field(&value, "userId")?.to_string();

        let credentials = config_params(&[("username", username), ("password", password)]);
        self.action_ok(
            "users",
            "setAuthenticationCredentials",
            &[
                ("contextId", context.0.as_str()),
                ("userId", user_id.as_str()),
                ("authCredentialsConfigParams", credentials.as_str()),
            ],
        )
        .await?;
        self.action_ok(
            "users",
            "setUserEnabled",
            &[("contextId", context.0.as_str()), ("userId", user_id.as_str()), ("enabled", "true")],
        )
        .await?;
        Ok(user_id)
    }

    async fn set_forced_user(&self, context: &ContextId, user_id: &str) -> Result<(), DastError> {
        self.action_ok("forcedUser", "setForcedUser", &[("contextId", context.0.as_str()), ("userId", user_id)])
            .await?;
        self.action_ok("forcedUser", "setForcedUserModeEnabled", &[("boolean", "true")]).await
    }

    async fn add_request_header(
        &self,
        description: &str,
        header: &str,
        value: &str,
        url_regex: &str,
    ) -> Result<(), DastError> {
        self.action_ok(
            "replacer",
            "addRule",
            &[
                ("description", description),
                ("enabled", "true"),
                ("matchType", "REQ_HEADER"),
                ("matchRegex", "false"),
                ("matchString", header),
                ("replacement", value),
                ("url", url_regex),
            ],
        )
        .await
    }

    async fn start_phase(&self, kind: PhaseKind, request: &PhaseRequest) -> Result<JobId, DastError> {
        match kind {
            PhaseKind::Spider => {
                if let Some(depth) = request.depth {
                    self.action_ok("spider", "setOptionMaxDepth", &[("Integer", depth.to_string().as_str())]).await?;
                }
                if let Some(threads) = request.threads {
                    self.action_ok("spider", "setOptionThreadCount", &[("Integer", threads.to_string().as_str())]).await?;
                }
                let value = self
                    .call(
                        "spider",
                        "action",
                        "scan",
                        &[
                            ("url", request.target_url.as_str()),
                            ("contextName", request.context_name.as_str()),
                            ("recurse", "true"),
                        ],
                    )
                    .await?;
                Ok(JobId(string_field(&value, "scan")?.to_string()))
            }
            PhaseKind::AjaxSpider => {
                if let Some(browser) = &request.browser_id {
                    self.action_ok("ajaxSpider", "setOptionBrowserId", &[("String", browser.as_str())]).await?;
                }
                let value = self
                    .call(
                        "ajaxSpider",
                        "action",
                        "scan",
                        &[
                            ("url", request.target_url.as_str()),
                            ("inScope", "true"),
                            ("contextName", request.context_name.as_str()),
                        ],
                    )
                    .await?;
                // The AJAX spider is a singleton; its acknowledgement doubles as the job handle.
                Ok(JobId(string_field(&value, "Result")?.to_string()))
            }
            PhaseKind::ActiveScan => {
                if let Some(threads) = request.threads {
                    self.action_ok("ascan", "setOptionThreadPerHost", &[("Integer", threads.to_string().as_str())]).await?;
                }
                let value = self
                    .call(
                        "ascan",
                        "action",
                        "scan",
                        &[
                            ("url", request.target_url.as_str()),
                            ("recurse", "true"),
                            ("inScopeOnly", "true"),
                            ("contextId", request.context_id.as_str()),
                        ],
                    )
                    .await?;
                Ok(JobId(string_field(&value, "scan")?.to_string()))
            }
        }
    }

    async fn phase_progress(&self, kind: PhaseKind, job: &JobId) -> Result<PhaseProgress, DastError> {
        let value = match kind {
            PhaseKind::Spider => self.call("spider", "view", "status", &[("scanId", job.0.as_str())]).await?,
            PhaseKind::AjaxSpider => self.call("ajaxSpider", "view", "status", &[]).await?,
            PhaseKind::ActiveScan => self.call("ascan", "view", "status", &[("scanId", job.0.as_str())]).await?,
        };
        let status = string_field(&value, "status")?;
        match kind {
            PhaseKind::AjaxSpider => Ok(PhaseProgress::Running(status.eq_ignore_ascii_case("running"))),
            _ => status
                .parse::<u8>()
                .map(PhaseProgress::Percent)
                .map_err(|_| DastError::MalformedResponse(format!("{} status '{}' is not a percentage", kind, status))),
        }
    }

    async fn stop_phase(&self, kind: PhaseKind, job: &JobId) -> Result<(), DastError> {
        match kind {
            PhaseKind::Spider => self.action_ok("spider", "stop", &[("scanId", job.0.as_str())]).await,
            PhaseKind::AjaxSpider => self.action_ok("ajaxSpider", "stop", &[]).await,
            PhaseKind::ActiveScan => self.action_ok("ascan", "stop", &[("scanId", job.0.as_str())]).await,
        }
    }

    async fn report(&self) -> Result<RawReport, DastError> {
        let url = self.base_url.join("OTHER/core/other/jsonreport/")
            .map_err(|e| DastError::Internal(format!("Bad report path: {}", e)))?;
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(engine_error(status, &body, "OTHER/core/other/jsonreport/"));
        }
        serde_json::from_str(&body)
            .map_err(|e| DastError::MalformedResponse(format!("report: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_names_array() {
        let names = context_names(&json!({"contextList": ["Default Context", "dast-scan-context"]}));
        assert_eq!(names, vec!["Default Context", "dast-scan-context"]);
    }

    #[test]
    fn test_context_names_bracketed_string() {
        let names = context_names(&json!({"contextList": "[Default Context, dast-scan-context]"}));
        assert_eq!(names, vec!["Default Context", "dast-scan-context"]);
    }

    #[test]
    fn test_string_field_rejects_empty() {
        assert!(matches!(
            string_field(&json!({"scan": ""}), "scan"),
            Err(DastError::MalformedResponse(_))
        ));
        assert_eq!(string_field(&json!({"scan": "3"}), "scan").unwrap(), "3");
    }

    #[test]
    fn test_engine_error_with_code() {
        let err = engine_error(reqwest::StatusCode::BAD_REQUEST, r#"{"code":"does_not_exist","message":"Does Not Exist"}"#, "x");
        assert!(matches!(err, DastError::Engine(ref m) if m.contains("does_not_exist")));
    }

    #[test]
    fn test_engine_error_server_error_is_transient() {
        let err = engine_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down", "x");
        assert!(err.classify().retryable);
    }

    #[test]
    fn test_config_params_encoding() {
        let encoded = config_params(&[("loginUrl", "https://app/login?x=1"), ("loginRequestData", "u={%username%}&p={%password%}")]);
        assert!(encoded.starts_with("loginUrl=https%3A%2F%2Fapp%2Flogin%3Fx%3D1&"));
        assert!(encoded.contains("loginRequestData=u%3D%7B%25username%25%7D%26p%3D%7B%25password%25%7D"));
    }

    #[test]
    fn test_new_normalizes_trailing_slash() {
        let client = ZapClient::new("http://127.0.0.1:8090", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url.as_str(), "http://127.0.0.1:8090/");
        assert!(ZapClient::new("not a url", Duration::from_secs(5)).is_err());
    }
}
