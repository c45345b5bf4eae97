use crate::circuit_breaker::FailureKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Which side of the router produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Remote analysis service
    Primary,
    /// Local, always-available substitute
    Fallback,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Primary => write!(f, "primary"),
            ProviderKind::Fallback => write!(f, "fallback"),
        }
    }
}

/// Text submitted for analysis; passed unchanged to whichever provider answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// User input to analyze
    pub text: String,
    /// Optional free-form context, e.g. the previous prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl AnalysisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: None,
        }
    }
}

/// Emotion analysis of a piece of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Dominant emotion label, e.g. "joy"
    pub emotion: String,
    /// Valence in `[-1.0, 1.0]`
    pub sentiment: f32,
    /// Strength of the emotion in `[0.0, 1.0]`
    pub intensity: f32,
    /// How much the producer trusts this answer, in `[0.0, 1.0]`.
    ///
    /// Advisory only: a primary answer may score below the fallback cap.
    /// Use `degraded` to tell the two apart.
    pub confidence: f32,
    /// Words that drove the classification
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Producer of the result
    pub provider: ProviderKind,
    /// True exactly when the answer came from the fallback
    pub degraded: bool,
}

/// Diagnostic hint about a provider; never consulted for routing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthHint {
    pub ok: bool,
    pub name: String,
}

/// Failure reported by a provider adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Upstream returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl ProviderError {
    /// Classify a non-success HTTP status
    ///
    /// | Code | Classification |
    /// |------|----------------|
    /// | 401/403 | Unauthorized (disqualifying) |
    /// | 402/429 | QuotaExhausted (disqualifying) |
    /// | 408 | Timeout |
    /// | other | Upstream (transient) |
    pub fn from_status(status: u16, message: impl Into<String>, timeout: Duration) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ProviderError::Unauthorized(message),
            402 | 429 => ProviderError::QuotaExhausted(message),
            408 => ProviderError::Timeout(timeout),
            _ => ProviderError::Upstream { status, message },
        }
    }

    /// How this failure counts against the circuit
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ProviderError::QuotaExhausted(_) | ProviderError::Unauthorized(_) => {
                FailureKind::Disqualifying
            }
            ProviderError::Timeout(_) => FailureKind::Timeout,
            ProviderError::Transport(_)
            | ProviderError::Upstream { .. }
            | ProviderError::MalformedResponse(_) => FailureKind::Transient,
        }
    }

    pub fn is_disqualifying(&self) -> bool {
        self.failure_kind().is_disqualifying()
    }

    /// Short stable code for diagnostics
    pub fn code(&self) -> String {
        match self {
            ProviderError::Timeout(_) => "timeout".to_string(),
            ProviderError::Transport(_) => "transport".to_string(),
            ProviderError::Upstream { status, .. } => format!("upstream_{}", status),
            ProviderError::MalformedResponse(_) => "malformed_response".to_string(),
            ProviderError::QuotaExhausted(_) => "quota_exhausted".to_string(),
            ProviderError::Unauthorized(_) => "unauthorized".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn test_status_classification() {
        assert_eq!(
            ProviderError::from_status(429, "slow down", TIMEOUT),
            ProviderError::QuotaExhausted("slow down".to_string())
        );
        assert!(ProviderError::from_status(402, "", TIMEOUT).is_disqualifying());
        assert!(ProviderError::from_status(401, "", TIMEOUT).is_disqualifying());
        assert!(ProviderError::from_status(403, "", TIMEOUT).is_disqualifying());
        assert_eq!(
            ProviderError::from_status(408, "", TIMEOUT),
            ProviderError::Timeout(TIMEOUT)
        );
        assert!(!ProviderError::from_status(503, "", TIMEOUT).is_disqualifying());
        assert!(!ProviderError::from_status(400, "", TIMEOUT).is_disqualifying());
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(
            ProviderError::Timeout(TIMEOUT).failure_kind(),
            FailureKind::Timeout
        );
        assert_eq!(
            ProviderError::MalformedResponse("eof".into()).failure_kind(),
            FailureKind::Transient
        );
        assert_eq!(
            ProviderError::Unauthorized("no key".into()).failure_kind(),
            FailureKind::Disqualifying
        );
    }

    #[test]
    fn test_error_codes() {
        let err = ProviderError::Upstream {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(err.code(), "upstream_503");
        assert_eq!(err.to_string(), "Upstream returned status 503: unavailable");
        assert_eq!(
            ProviderError::QuotaExhausted(String::new()).code(),
            "quota_exhausted"
        );
    }

    #[test]
    fn test_request_deserializes_without_context() {
        let request: AnalysisRequest = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(request, AnalysisRequest::new("hello"));
    }

    #[test]
    fn test_provider_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&ProviderKind::Fallback).unwrap(),
            "\"fallback\""
        );
        assert_eq!(ProviderKind::Primary.to_string(), "primary");
    }
}
