use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::engine::{ContextId, ScanEngine};
use crate::errors::DastError;
use super::auth::{cookie_header, oauth_as_form, parse_cookies, AuthConfig, FormCredentials};

const SCAN_USER_NAME: &str = "dastctl-user";

/// Prepares the engine-side context and authentication for one session.
pub struct SessionConfigurator {
    engine: Arc<dyn ScanEngine>,
}

impl SessionConfigurator {
    pub fn new(engine: Arc<dyn ScanEngine>) -> Self {
        Self { engine }
    }

    /// Look the context up by name and create it only when absent, then
    /// scope it to the target.
    pub async fn create_or_reuse_context(&self, name: &str, target: &Url) -> Result<ContextId, DastError> {
        let context_id = match self.engine.find_context(name).await? {
            Some(existing) => {
                info!(context = %name, context_id = %existing, "Reusing existing scan context");
                existing
            }
            None => {
                let created = self.engine.create_context(name).await?;
                info!(context = %name, context_id = %created, "Created scan context");
                created
            }
        };

        let regex = scope_regex(target)?;
        debug!(context = %name, regex = %regex, "Including target in context");
        self.engine.include_in_context(name, &regex).await?;
        Ok(context_id)
    }

    /// Apply the session's authentication strategy. Missing credentials are
    /// reported before the engine is contacted; engine failures become
    /// [`DastError::Authentication`].
    pub async fn configure_auth(
        &self,
        context: &ContextId,
        auth: &AuthConfig,
        target: &Url,
    ) -> Result<(), DastError> {
        match auth {
            AuthConfig::None => {
                debug!("No authentication configured");
                Ok(())
            }
            AuthConfig::Form(form) => {
                let creds = form.require()?;
                self.apply_form(context, &creds).await
            }
            AuthConfig::Token { bearer_token } => {
                let token = bearer_token.trim();
                if token.is_empty() {
                    return Err(DastError::Config("Token authentication requires a bearer token".into()));
                }
                let scope = scope_regex(target)?;
                self.engine
                    .add_request_header("dastctl bearer token", "Authorization", &format!("Bearer {}", token), &scope)
                    .await
                    .map_err(|e| rejected("bearer token header", e))?;
                info!("Bearer token authentication configured");
                Ok(())
            }
            AuthConfig::Cookie { name_value_pairs } => {
                let cookies = parse_cookies(name_value_pairs);
                if cookies.is_empty() {
                    warn!("No valid cookies supplied; continuing without a Cookie header");
                    return Ok(());
                }
                let scope = scope_regex(target)?;
                self.engine
                    .add_request_header("dastctl session cookies", "Cookie", &cookie_header(&cookies), &scope)
                    .await
                    .map_err(|e| rejected("cookie header", e))?;
                let names: Vec<&str> = cookies.iter().map(|c| c.name.as_str()).collect();
                info!(count = cookies.len(), cookies = ?names, "Cookie authentication configured");
                Ok(())
            }
            AuthConfig::OAuthFallback(form) => {
                let creds = oauth_as_form(form, target.as_str())?;
                warn!("OAuth is not natively supported; using form-based login with the supplied credentials");
                self.apply_form(context, &creds).await
            }
        }
    }

    async fn apply_form(&self, context: &ContextId, creds: &FormCredentials) -> Result<(), DastError> {
        self.engine
            .set_form_authentication(context, &creds.login_url, &creds.login_request_data())
            .await
            .map_err(|e| rejected("form authentication method", e))?;
        let user_id = self
            .engine
            .create_user(context, SCAN_USER_NAME, &creds.username, &creds.password)
            .await
            .map_err(|e| rejected("scan user", e))?;
        self.engine
            .set_forced_user(context, &user_id)
            .await
            .map_err(|e| rejected("forced user", e))?;
        info!(login_url = %creds.login_url, user_id = %user_id, "Form authentication configured");
        Ok(())
    }
}

fn rejected(what: &str, err: DastError) -> DastError {
    match err {
        DastError::Cancelled(_) => err,
        other => DastError::Authentication(format!("Engine rejected {}: {}", what, other)),
    }
}

/// Inclusion pattern matching every URL on the target's host and port.
pub fn scope_regex(target: &Url) -> Result<String, DastError> {
    let host = target
        .host_str()
        .ok_or_else(|| DastError::InvalidTarget(format!("Target has no host: {}", target)))?;
    let port = match target.port() {
        Some(port) => format!(":{}", port),
        None => r"(?::\d+)?".to_string(),
    };
    Ok(format!(r"^https?://{}{}(?:[/?#].*)?$", regex::escape(host), port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scripted::{EngineCall, FailingOp, ScriptedEngine, ScriptedStatus};
    use crate::session::auth::FormAuth;

    fn target() -> Url {
        Url::parse("https://staging.example.com/app").unwrap()
    }

    fn setup(engine: ScriptedEngine) -> (Arc<ScriptedEngine>, SessionConfigurator) {
        let engine = Arc::new(engine);
        let configurator = SessionConfigurator::new(engine.clone());
        (engine, configurator)
    }

    #[test]
    fn test_scope_regex_matches_host_only() {
        let re = regex::Regex::new(&scope_regex(&target()).unwrap()).unwrap();
        assert!(re.is_match("https://staging.example.com"));
        assert!(re.is_match("https://staging.example.com/login?next=/"));
        assert!(re.is_match("http://staging.example.com:8080/x"));
        assert!(!re.is_match("https://staging.example.com.evil.io/"));
        assert!(!re.is_match("https://stagingXexample.com/"));
    }

    #[test]
    fn test_scope_regex_pins_explicit_port() {
        let url = Url::parse("http://localhost:3000").unwrap();
        let re = regex::Regex::new(&scope_regex(&url).unwrap()).unwrap();
        assert!(re.is_match("http://localhost:3000/api"));
        assert!(!re.is_match("http://localhost:4000/api"));
    }

    #[tokio::test]
    async fn test_context_reused_by_name() {
        let (engine, configurator) = setup(ScriptedEngine::new());
        let first = configurator.create_or_reuse_context("dast-scan-context", &target()).await.unwrap();
        let second = configurator.create_or_reuse_context("dast-scan-context", &target()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.count(|c| matches!(c, EngineCall::CreateContext(_))), 1);
    }

    #[tokio::test]
    async fn test_existing_context_never_created() {
        let (engine, configurator) = setup(ScriptedEngine::new().with_existing_context("nightly", "7"));
        let id = configurator.create_or_reuse_context("nightly", &target()).await.unwrap();
        assert_eq!(id, ContextId("7".into()));
        assert_eq!(engine.count(|c| matches!(c, EngineCall::CreateContext(_))), 0);
    }

    #[tokio::test]
    async fn test_form_missing_username_makes_no_engine_call() {
        let (engine, configurator) = setup(ScriptedEngine::new());
        let auth = AuthConfig::Form(FormAuth {
            auth_url: Some("https://staging.example.com/login".into()),
            password: Some("pw".into()),
            ..Default::default()
        });
        let err = configurator.configure_auth(&ContextId("1".into()), &auth, &target()).await.unwrap_err();
        assert!(matches!(err, DastError::Config(_)));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_form_auth_creates_and_forces_user() {
        let (engine, configurator) = setup(ScriptedEngine::new());
        let auth = AuthConfig::Form(FormAuth {
            auth_url: Some("https://staging.example.com/login".into()),
            username: Some("scanner".into()),
            password: Some("hunter22".into()),
            ..Default::default()
        });
        configurator.configure_auth(&ContextId("1".into()), &auth, &target()).await.unwrap();
        assert_eq!(
            engine.calls(),
            vec![
                EngineCall::SetFormAuthentication {
                    login_url: "https://staging.example.com/login".into(),
                    login_request_data: "username={%username%}&password={%password%}".into(),
                },
                EngineCall::CreateUser { name: SCAN_USER_NAME.into(), username: "scanner".into() },
                EngineCall::SetForcedUser("0".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_token_header() {
        let (engine, configurator) = setup(ScriptedEngine::new());
        let auth = AuthConfig::Token { bearer_token: "abc.def".into() };
        configurator.configure_auth(&ContextId("1".into()), &auth, &target()).await.unwrap();
        assert_eq!(
            engine.calls(),
            vec![EngineCall::AddRequestHeader {
                header: "Authorization".into(),
                value: "Bearer abc.def".into(),
                url_regex: scope_regex(&target()).unwrap(),
            }]
        );
    }

    #[tokio::test]
    async fn test_cookie_skips_malformed_segment() {
        let (engine, configurator) = setup(ScriptedEngine::new());
        let auth = AuthConfig::Cookie { name_value_pairs: "session=abc123; malformed; csrf=def456".into() };
        configurator.configure_auth(&ContextId("1".into()), &auth, &target()).await.unwrap();
        assert_eq!(
            engine.calls(),
            vec![EngineCall::AddRequestHeader {
                header: "Cookie".into(),
                value: "session=abc123; csrf=def456".into(),
                url_regex: scope_regex(&target()).unwrap(),
            }]
        );
    }

    #[tokio::test]
    async fn test_oauth_without_credentials() {
        let (engine, configurator) = setup(ScriptedEngine::new());
        let auth = AuthConfig::OAuthFallback(FormAuth::default());
        let err = configurator.configure_auth(&ContextId("1".into()), &auth, &target()).await.unwrap_err();
        assert!(err.to_string().contains("OAuth not implemented without credentials"));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_oauth_falls_back_to_target_login_url() {
        let (engine, configurator) = setup(ScriptedEngine::new());
        let auth = AuthConfig::OAuthFallback(FormAuth {
            username: Some("scanner".into()),
            password: Some("hunter22".into()),
            ..Default::default()
        });
        configurator.configure_auth(&ContextId("1".into()), &auth, &target()).await.unwrap();
        assert!(engine.calls().contains(&EngineCall::SetFormAuthentication {
            login_url: target().to_string(),
            login_request_data: "username={%username%}&password={%password%}".into(),
        }));
    }

    #[tokio::test]
    async fn test_engine_rejection_is_authentication_error() {
        let (_, configurator) =
            setup(ScriptedEngine::new().failing(FailingOp::AddRequestHeader, ScriptedStatus::EngineError));
        let auth = AuthConfig::Token { bearer_token: "abc.def".into() };
        let err = configurator.configure_auth(&ContextId("1".into()), &auth, &target()).await.unwrap_err();
        assert!(matches!(err, DastError::Authentication(_)));
        assert_eq!(err.exit_code(), 2);
    }
}
