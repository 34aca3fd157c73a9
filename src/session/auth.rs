use std::fmt;

use serde::{Deserialize, Serialize};
use crate::errors::DastError;
use tracing::warn;

/// Authentication method label as selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    None,
    Form,
    Token,
    Cookie,
    Oauth,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Form => "form",
            Self::Token => "token",
            Self::Cookie => "cookie",
            Self::Oauth => "oauth",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_LOGIN_FIELD: &str = "username";
pub const DEFAULT_PASSWORD_FIELD: &str = "password";

/// Form login inputs as configured. Required fields are checked by
/// [`FormAuth::require`] so that a missing value fails before any engine call.
#[derive(Clone, PartialEq, Eq)]
pub struct FormAuth {
    pub auth_url: Option<String>,
    pub login_field: String,
    pub password_field: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for FormAuth {
    fn default() -> Self {
        Self {
            auth_url: None,
            login_field: DEFAULT_LOGIN_FIELD.to_string(),
            password_field: DEFAULT_PASSWORD_FIELD.to_string(),
            username: None,
            password: None,
        }
    }
}

/// Form login with every required field present.
#[derive(Clone, PartialEq, Eq)]
pub struct FormCredentials {
    pub login_url: String,
    pub login_field: String,
    pub password_field: String,
    pub username: String,
    pub password: String,
}

impl FormCredentials {
    /// Engine login request template; `{%username%}`/`{%password%}` are
    /// substituted engine-side with the scan user's credentials.
    pub fn login_request_data(&self) -> String {
        format!(
            "{}={{%username%}}&{}={{%password%}}",
            self.login_field, self.password_field
        )
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl FormAuth {
    pub fn require(&self) -> Result<FormCredentials, DastError> {
        let mut missing = Vec::new();
        if present(&self.auth_url).is_none() {
            missing.push("auth URL");
        }
        if present(&self.username).is_none() {
            missing.push("username");
        }
        if present(&self.password).is_none() {
            missing.push("password");
        }
        if !missing.is_empty() {
            return Err(DastError::Config(format!(
                "Form authentication requires {}",
                missing.join(", ")
            )));
        }

        Ok(FormCredentials {
            login_url: present(&self.auth_url).unwrap_or_default().to_string(),
            login_field: self.login_field.clone(),
            password_field: self.password_field.clone(),
            username: present(&self.username).unwrap_or_default().to_string(),
            password: self.password.clone().unwrap_or_default(),
        })
    }
}

/// Immutable authentication strategy for the session.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthConfig {
    None,
    Form(FormAuth),
    Token { bearer_token: String },
    Cookie { name_value_pairs: String },
    /// Delegates to form login when credentials are present.
    OAuthFallback(FormAuth),
}

impl AuthConfig {
    pub fn method(&self) -> AuthMethod {
        match self {
            AuthConfig::None => AuthMethod::None,
            AuthConfig::Form(_) => AuthMethod::Form,
            AuthConfig::Token { .. } => AuthMethod::Token,
            AuthConfig::Cookie { .. } => AuthMethod::Cookie,
            AuthConfig::OAuthFallback(_) => AuthMethod::Oauth,
        }
    }

    /// Check everything that can be checked without the engine.
    pub fn validate(&self, target_url: &str) -> Result<(), DastError> {
        match self {
            AuthConfig::None | AuthConfig::Cookie { .. } => Ok(()),
            AuthConfig::Form(form) => form.require().map(|_| ()),
            AuthConfig::Token { bearer_token } => {
                if bearer_token.trim().is_empty() {
                    Err(DastError::Config("Token authentication requires a bearer token".into()))
                } else {
                    Ok(())
                }
            }
            AuthConfig::OAuthFallback(form) => oauth_as_form(form, target_url).map(|_| ()),
        }
    }
}

/// OAuth is served by form login. The target URL stands in for a missing
/// auth URL.
pub fn oauth_as_form(form: &FormAuth, target_url: &str) -> Result<FormCredentials, DastError> {
    if present(&form.username).is_none() || present(&form.password).is_none() {
        return Err(DastError::Config("OAuth not implemented without credentials".into()));
    }
    let mut delegated = form.clone();
    if present(&delegated.auth_url).is_none() {
        delegated.auth_url = Some(target_url.to_string());
    }
    delegated.require()
}

impl fmt::Debug for FormAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormAuth")
            .field("auth_url", &self.auth_url)
            .field("login_field", &self.login_field)
            .field("password_field", &self.password_field)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl fmt::Debug for FormCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormCredentials")
            .field("login_url", &self.login_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::None => write!(f, "None"),
            AuthConfig::Form(form) => f.debug_tuple("Form").field(form).finish(),
            AuthConfig::Token { .. } => write!(f, "Token {{ bearer_token: [REDACTED] }}"),
            AuthConfig::Cookie { .. } => write!(f, "Cookie {{ name_value_pairs: [REDACTED] }}"),
            AuthConfig::OAuthFallback(form) => f.debug_tuple("OAuthFallback").field(form).finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// Parse a `name=value; name2=value2` list. Segments without `=` or with an
/// empty name are skipped with a warning; blank segments are ignored.
pub fn parse_cookies(raw: &str) -> Vec<Cookie> {
    let mut cookies = Vec::new();
    for segment in raw.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        match segment.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => cookies.push(Cookie {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            }),
            _ => warn!(segment = %segment, "Skipping malformed cookie (expected name=value)"),
        }
    }
    cookies
}

/// Single `Cookie` header value for the parsed pairs.
pub fn cookie_header(cookies: &[Cookie]) -> String {
    cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(auth_url: Option<&str>, username: Option<&str>, password: Option<&str>) -> FormAuth {
        FormAuth {
            auth_url: auth_url.map(String::from),
            username: username.map(String::from),
            password: password.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_cookies_skips_malformed() {
        let cookies = parse_cookies("session=abc123; malformed; csrf=def456");
        assert_eq!(
            cookies,
            vec![
                Cookie { name: "session".into(), value: "abc123".into() },
                Cookie { name: "csrf".into(), value: "def456".into() },
            ]
        );
    }

    #[test]
    fn test_parse_cookies_value_with_equals() {
        let cookies = parse_cookies("jwt=a.b=c;");
        assert_eq!(cookies, vec![Cookie { name: "jwt".into(), value: "a.b=c".into() }]);
    }

    #[test]
    fn test_parse_cookies_empty_name_is_malformed() {
        assert!(parse_cookies("=orphan; ;").is_empty());
    }

    #[test]
    fn test_cookie_header() {
        let header = cookie_header(&parse_cookies("a=1;b=2"));
        assert_eq!(header, "a=1; b=2");
    }

    #[test]
    fn test_form_requires_username() {
        let err = form(Some("https://app/login"), None, Some("pw")).require().unwrap_err();
        assert!(matches!(err, DastError::Config(ref m) if m.contains("username")));
    }

    #[test]
    fn test_form_lists_all_missing_fields() {
        let err = form(None, None, None).require().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("auth URL") && msg.contains("username") && msg.contains("password"));
    }

    #[test]
    fn test_form_blank_values_are_missing() {
        assert!(form(Some("https://app/login"), Some("  "), Some("pw")).require().is_err());
    }

    #[test]
    fn test_login_request_data_uses_field_names() {
        let mut f = form(Some("https://app/login"), Some("alice"), Some("pw"));
        f.login_field = "email".into();
        let creds = f.require().unwrap();
        assert_eq!(creds.login_request_data(), "email={%username%}&password={%password%}");
    }

    #[test]
    fn test_token_requires_value() {
        let auth = AuthConfig::Token { bearer_token: " ".into() };
        assert!(auth.validate("https://app").is_err());
        let auth = AuthConfig::Token { bearer_token: "abc".into() };
        assert!(auth.validate("https://app").is_ok());
    }

    #[test]
    fn test_oauth_without_credentials_is_config_error() {
        let err = oauth_as_form(&form(None, Some("alice"), None), "https://app").unwrap_err();
        assert!(err.to_string().contains("OAuth not implemented without credentials"));
    }

    #[test]
    fn test_oauth_delegates_to_form_with_target_fallback() {
        let creds = oauth_as_form(&form(None, Some("alice"), Some("pw")), "https://app").unwrap();
        assert_eq!(creds.login_url, "https://app");
        assert_eq!(creds.username, "alice");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let auth = AuthConfig::Form(form(Some("https://app/login"), Some("alice"), Some("hunter22")));
        let rendered = format!("{:?}", auth);
        assert!(!rendered.contains("hunter22"));
        let token = AuthConfig::Token { bearer_token: "tok-secret".into() };
        assert!(!format!("{:?}", token).contains("tok-secret"));
    }

    #[test]
    fn test_method_labels() {
        assert_eq!(AuthConfig::None.method(), AuthMethod::None);
        assert_eq!(AuthConfig::OAuthFallback(FormAuth::default()).method(), AuthMethod::Oauth);
        assert_eq!(AuthMethod::Cookie.to_string(), "cookie");
    }
}
