use crate::circuit_breaker::{
    Admission, BreakerSnapshot, CircuitBreaker, CircuitState, ProbeGuard, RetryExecutor,
};
use crate::clock::{Clock, SystemClock};
use crate::config::RouterConfig;
use crate::error::{Result, RouterError};
use crate::metrics::{self, Timer};
use crate::provider::{
    AnalysisProvider, AnalysisRequest, AnalysisResult, HealthHint, HttpProvider, KeywordProvider,
    ProviderError,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Routes analysis requests to the primary provider while it is healthy and
/// to the fallback otherwise.
///
/// `analyze` only returns `Err` when the fallback itself fails. Every primary
/// failure is absorbed: it updates the circuit breaker and the request is
/// answered by the fallback instead.
pub struct ProviderRouter {
    breaker: CircuitBreaker,
    retry: RetryExecutor,
    primary: Arc<dyn AnalysisProvider>,
    fallback: Arc<dyn AnalysisProvider>,
    attempt_timeout: Duration,
    offline_mode: bool,
}

/// Read-only view for health endpoints
#[derive(Debug, Clone, Serialize)]
pub struct RouterStatus {
    #[serde(flatten)]
    pub circuit: BreakerSnapshot,
    pub offline_mode: bool,
    pub primary: HealthHint,
    pub fallback: HealthHint,
}

impl std::fmt::Debug for ProviderRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRouter")
            .field("breaker", &self.breaker)
            .field("retry", &self.retry)
            .field("primary", &self.primary.health_hint().name)
            .field("fallback", &self.fallback.health_hint().name)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("offline_mode", &self.offline_mode)
            .finish()
    }
}

impl ProviderRouter {
    /// Create a router from explicit collaborators.
    ///
    /// Fails fast on invalid configuration; nothing is validated per request.
    pub fn new(
        config: &RouterConfig,
        primary: Arc<dyn AnalysisProvider>,
        fallback: Arc<dyn AnalysisProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let name = primary.health_hint().name;
        Ok(Self {
            breaker: CircuitBreaker::new(name, config.circuit_breaker.clone(), clock),
            retry: RetryExecutor::new(&config.retry),
            primary,
            fallback,
            attempt_timeout: config.primary.request_timeout(),
            offline_mode: config.offline_mode,
        })
    }

    /// Create a router with the HTTP primary, keyword fallback and system clock
    pub fn from_config(config: &RouterConfig) -> Result<Self> {
        let primary = HttpProvider::new(&config.primary)?;
        Self::new(
            config,
            Arc::new(primary),
            Arc::new(KeywordProvider::new()),
            Arc::new(SystemClock),
        )
    }

    /// Analyze a request, degrading to the fallback when the primary is unavailable
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        let timer = Timer::start();
        let result = self.route(request).await?;
        timer.record(&result.provider.to_string(), result.degraded);
        Ok(result)
    }

    async fn route(&self, request: &AnalysisRequest) -> Result<AnalysisResult> {
        if self.offline_mode {
            return self.use_fallback(request, "offline").await;
        }

        match self.breaker.try_acquire() {
            Admission::Rejected(rejection) => {
                self.use_fallback(request, rejection.reason()).await
            }
            Admission::Closed => {
                let outcome = self
                    .retry
                    .execute_with_predicate(
                        || self.attempt(request),
                        |e: &ProviderError| !e.is_disqualifying(),
                    )
                    .await;

                match outcome {
                    Ok(result) => {
                        self.breaker.record_success();
                        Ok(result)
                    }
                    Err(e) => {
                        self.breaker
                            .record_failure(e.failure_kind(), Some(e.code().as_str()));
                        self.degrade(request, &e).await
                    }
                }
            }
            Admission::Probe(guard) => self.probe(request, guard).await,
        }
    }

    /// Single half-open attempt; no retries so a failure is visible at once
    async fn probe(
        &self,
        request: &AnalysisRequest,
        guard: ProbeGuard<'_>,
    ) -> Result<AnalysisResult> {
        match self.attempt(request).await {
            Ok(result) => {
                guard.succeed();
                Ok(result)
            }
            Err(e) => {
                guard.fail(e.failure_kind(), Some(e.code().as_str()));
                self.degrade(request, &e).await
            }
        }
    }

    /// One primary call bounded by the attempt timeout
    async fn attempt(
        &self,
        request: &AnalysisRequest,
    ) -> std::result::Result<AnalysisResult, ProviderError> {
        let outcome = tokio::time::timeout(self.attempt_timeout, self.primary.analyze(request))
            .await
            .unwrap_or(Err(ProviderError::Timeout(self.attempt_timeout)));

        match &outcome {
            Ok(_) => metrics::record_primary_attempt("success"),
            Err(e) => metrics::record_primary_attempt(&e.code()),
        }
        outcome
    }

    async fn degrade(
        &self,
        request: &AnalysisRequest,
        cause: &ProviderError,
    ) -> Result<AnalysisResult> {
        warn!(
            error = %cause,
            code = %cause.code(),
            disqualifying = cause.is_disqualifying(),
            state = %self.breaker.state(),
            "Primary provider failed, answering from fallback"
        );
        self.use_fallback(request, "primary_failed").await
    }

    async fn use_fallback(
        &self,
        request: &AnalysisRequest,
        reason: &str,
    ) -> Result<AnalysisResult> {
        debug!(reason, "Routing request to fallback provider");
        metrics::record_fallback(reason);

        self.fallback.analyze(request).await.map_err(|e| {
            error!(error = %e, "Fallback provider failed");
            RouterError::Fallback(e)
        })
    }

    /// Snapshot of breaker state and provider hints
    pub fn status(&self) -> RouterStatus {
        RouterStatus {
            circuit: self.breaker.snapshot(),
            offline_mode: self.offline_mode,
            primary: self.primary.health_hint(),
            fallback: self.fallback.health_hint(),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn is_offline(&self) -> bool {
        self.offline_mode
    }
}
