use super::types::DastError;

/// Failure taxonomy as seen by operators. Each kind maps to a distinct
/// user-facing message and exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Invalid or missing inputs, detected before the engine is touched.
    Configuration,
    /// The engine is gone or rejected a session-level command.
    FatalEngine,
    /// A single failed request that may succeed if repeated.
    TransientPoll,
    /// External interrupt.
    Cancelled,
    Internal,
}

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
    pub kind: FailureKind,
}

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_AUTH_FAILURE: i32 = 2;
/// Reserved for scan-level timeout escalation; phase timeouts never use it.
pub const EXIT_SCAN_TIMEOUT: i32 = 3;
pub const EXIT_POLICY_VIOLATION: i32 = 4;
pub const EXIT_INTERRUPTED: i32 = 130;

impl DastError {
    /// Classify this error to determine its type and whether it can be retried.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // Retryable errors
            DastError::Network(_) => ErrorClassification {
                error_type: "NetworkError",
                retryable: true,
                kind: FailureKind::TransientPoll,
            },
            DastError::Timeout(_) => ErrorClassification {
                error_type: "TimeoutError",
                retryable: true,
                kind: FailureKind::TransientPoll,
            },
            DastError::MalformedResponse(_) => ErrorClassification {
                error_type: "MalformedResponseError",
                retryable: true,
                kind: FailureKind::TransientPoll,
            },

            // Non-retryable errors
            DastError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                retryable: false,
                kind: FailureKind::Configuration,
            },
            DastError::InvalidTarget(_) => ErrorClassification {
                error_type: "InvalidTargetError",
                retryable: false,
                kind: FailureKind::Configuration,
            },
            DastError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                retryable: false,
                kind: FailureKind::Configuration,
            },
            DastError::Authentication(_) => ErrorClassification {
                error_type: "AuthenticationError",
                retryable: false,
                kind: FailureKind::FatalEngine,
            },
            DastError::EngineUnreachable(_) => ErrorClassification {
                error_type: "EngineUnreachableError",
                retryable: false,
                kind: FailureKind::FatalEngine,
            },
            DastError::Engine(_) => ErrorClassification {
                error_type: "EngineError",
                retryable: false,
                kind: FailureKind::FatalEngine,
            },
            DastError::Container(_) => ErrorClassification {
                error_type: "ContainerError",
                retryable: false,
                kind: FailureKind::FatalEngine,
            },
            DastError::Docker(_) => ErrorClassification {
                error_type: "DockerError",
                retryable: false,
                kind: FailureKind::FatalEngine,
            },
            DastError::Cancelled(_) => ErrorClassification {
                error_type: "CancelledError",
                retryable: false,
                kind: FailureKind::Cancelled,
            },
            DastError::Io(_) => ErrorClassification {
                error_type: "IoError",
                retryable: false,
                kind: FailureKind::Internal,
            },
            DastError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                retryable: false,
                kind: FailureKind::Internal,
            },
            DastError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                retryable: false,
                kind: FailureKind::Internal,
            },
        }
    }

    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            DastError::Authentication(_) => EXIT_AUTH_FAILURE,
            DastError::Cancelled(_) => EXIT_INTERRUPTED,
            _ => EXIT_FAILURE,
        }
    }

    /// Operator-facing headline that tells a broken scanner apart from bad input.
    pub fn headline(&self) -> &'static str {
        match self.classify().kind {
            FailureKind::Configuration => "Configuration error: the scan was not started",
            FailureKind::FatalEngine => "Scan engine failure: the scan was aborted and no verdict was produced",
            FailureKind::TransientPoll => "Scan engine communication failed: the scan was aborted",
            FailureKind::Cancelled => "Scan interrupted: the engine was torn down",
            FailureKind::Internal => "Internal error: the scan was aborted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_retryable() {
        let err = DastError::Network("connection refused".into());
        let class = err.classify();
        assert!(class.retryable);
        assert_eq!(class.kind, FailureKind::TransientPoll);
    }

    #[test]
    fn test_timeout_retryable() {
        let err = DastError::Timeout("timed out".into());
        assert!(err.classify().retryable);
    }

    #[test]
    fn test_config_error_not_retryable() {
        let err = DastError::Config("missing username".into());
        let class = err.classify();
        assert!(!class.retryable);
        assert_eq!(class.error_type, "ConfigError");
        assert_eq!(class.kind, FailureKind::Configuration);
    }

    #[test]
    fn test_engine_error_is_fatal() {
        let err = DastError::Engine("does_not_exist".into());
        let class = err.classify();
        assert!(!class.retryable);
        assert_eq!(class.kind, FailureKind::FatalEngine);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(DastError::Config("x".into()).exit_code(), EXIT_FAILURE);
        assert_eq!(DastError::InvalidTarget("x".into()).exit_code(), EXIT_FAILURE);
        assert_eq!(DastError::EngineUnreachable("x".into()).exit_code(), EXIT_FAILURE);
        assert_eq!(DastError::Authentication("x".into()).exit_code(), EXIT_AUTH_FAILURE);
        assert_eq!(DastError::Cancelled("x".into()).exit_code(), EXIT_INTERRUPTED);
    }

    #[test]
    fn test_headlines_are_distinct() {
        let config = DastError::Config("x".into()).headline();
        let fatal = DastError::Engine("x".into()).headline();
        let cancelled = DastError::Cancelled("x".into()).headline();
        assert_ne!(config, fatal);
        assert_ne!(fatal, cancelled);
    }
}
