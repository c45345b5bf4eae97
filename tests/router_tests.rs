use analysis_router::circuit_breaker::CircuitState;
use analysis_router::clock::ManualClock;
use analysis_router::config::RouterConfig;
use analysis_router::provider::{
    AnalysisProvider, AnalysisRequest, AnalysisResult, HealthHint, KeywordProvider, ProviderError,
    ProviderKind,
};
use analysis_router::router::ProviderRouter;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Primary that plays back scripted outcomes, then succeeds
#[derive(Debug, Default)]
struct ScriptedPrimary {
    script: Mutex<VecDeque<Result<(), ProviderError>>>,
    calls: AtomicU32,
    latency: Duration,
}

impl ScriptedPrimary {
    fn failing(times: usize, error: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(std::iter::repeat(Err(error)).take(times).collect()),
            ..Default::default()
        })
    }

    fn slow(latency: Duration, leading_failures: usize) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(
                std::iter::repeat(Err(ProviderError::Transport("refused".to_string())))
                    .take(leading_failures)
                    .collect(),
            ),
            latency,
            ..Default::default()
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisProvider for ScriptedPrimary {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Primary
    }

    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match next {
            Some(Err(e)) => Err(e),
            _ => Ok(AnalysisResult {
                emotion: "joy".to_string(),
                sentiment: 0.8,
                intensity: 0.7,
                confidence: 0.95,
                keywords: vec![request.text.clone()],
                provider: ProviderKind::Primary,
                degraded: false,
            }),
        }
    }

    fn health_hint(&self) -> HealthHint {
        HealthHint {
            ok: true,
            name: "scripted".to_string(),
        }
    }
}

fn config(threshold: u32, cooldown_secs: u64) -> RouterConfig {
    let mut config = RouterConfig::default();
    config.circuit_breaker.failure_threshold = threshold;
    config.circuit_breaker.cooldown_secs = cooldown_secs;
    config.retry.max_attempts = 1;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 2;
    config
}

fn router_with(
    config: &RouterConfig,
    primary: Arc<ScriptedPrimary>,
) -> (ProviderRouter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let router = ProviderRouter::new(
        config,
        primary,
        Arc::new(KeywordProvider::new()),
        clock.clone(),
    )
    .unwrap();
    (router, clock)
}

fn upstream_503() -> ProviderError {
    ProviderError::Upstream {
        status: 503,
        message: "Service Unavailable".to_string(),
    }
}

#[tokio::test]
async fn test_healthy_primary_answers() {
    let primary = ScriptedPrimary::failing(0, upstream_503());
    let (router, _clock) = router_with(&config(3, 60), primary.clone());

    let result = router
        .analyze(&AnalysisRequest::new("hello"))
        .await
        .unwrap();

    assert_eq!(result.provider, ProviderKind::Primary);
    assert!(!result.degraded);
    assert_eq!(primary.calls(), 1);
    assert_eq!(router.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_cooldown_scenario() {
    let primary = ScriptedPrimary::failing(3, upstream_503());
    let (router, clock) = router_with(&config(3, 60), primary.clone());
    let request = AnalysisRequest::new("I am so happy today");

    // Three consecutive failures open the circuit
    for _ in 0..3 {
        let result = router.analyze(&request).await.unwrap();
        assert_eq!(result.provider, ProviderKind::Fallback);
        assert!(result.degraded);
    }
    assert_eq!(router.state(), CircuitState::Open);
    assert_eq!(primary.calls(), 3);
    assert_eq!(router.status().circuit.open_remaining_ms, Some(60_000));

    // +30s: still open, fallback answers without touching the primary
    clock.advance(Duration::from_secs(30));
    let result = router.analyze(&request).await.unwrap();
    assert_eq!(result.provider, ProviderKind::Fallback);
    assert_eq!(primary.calls(), 3);
    assert_eq!(router.state(), CircuitState::Open);

    // +61s: exactly one probe, which succeeds and closes the circuit
    clock.advance(Duration::from_secs(31));
    let result = router.analyze(&request).await.unwrap();
    assert_eq!(result.provider, ProviderKind::Primary);
    assert_eq!(primary.calls(), 4);
    assert_eq!(router.state(), CircuitState::Closed);
    assert_eq!(router.breaker().consecutive_failures(), 0);
}

#[tokio::test]
async fn test_failed_probe_reopens_without_retry() {
    let mut cfg = config(1, 60);
    cfg.retry.max_attempts = 3;
    cfg.primary.request_timeout_secs = 5;
    let primary = ScriptedPrimary::failing(10, upstream_503());
    let (router, clock) = router_with(&cfg, primary.clone());
    let request = AnalysisRequest::new("nothing much");

    // Closed: the full retry budget is spent
    router.analyze(&request).await.unwrap();
    assert_eq!(primary.calls(), 3);
    assert_eq!(router.state(), CircuitState::Open);

    // Half-open: a single attempt
    clock.advance(Duration::from_secs(61));
    let result = router.analyze(&request).await.unwrap();
    assert!(result.degraded);
    assert_eq!(primary.calls(), 4);
    assert_eq!(router.state(), CircuitState::Open);
    assert_eq!(router.status().circuit.open_remaining_ms, Some(60_000));
}

#[tokio::test]
async fn test_offline_mode_never_touches_primary() {
    let mut cfg = config(1, 60);
    cfg.offline_mode = true;
    let primary = ScriptedPrimary::failing(5, upstream_503());
    let (router, clock) = router_with(&cfg, primary.clone());

    for _ in 0..5 {
        let result = router
            .analyze(&AnalysisRequest::new("so scared and nervous"))
            .await
            .unwrap();
        assert_eq!(result.provider, ProviderKind::Fallback);
        assert_eq!(result.emotion, "fear");
        clock.advance(Duration::from_secs(120));
    }

    assert_eq!(primary.calls(), 0);
    let status = router.status();
    assert!(status.offline_mode);
    assert_eq!(status.circuit.state, CircuitState::Closed);
    assert_eq!(status.circuit.metrics.admitted_requests, 0);
}

#[tokio::test]
async fn test_success_resets_consecutive_failures() {
    let primary = ScriptedPrimary::failing(2, upstream_503());
    let (router, _clock) = router_with(&config(3, 60), primary.clone());
    let request = AnalysisRequest::new("text");

    router.analyze(&request).await.unwrap();
    router.analyze(&request).await.unwrap();
    assert_eq!(router.breaker().consecutive_failures(), 2);

    let result = router.analyze(&request).await.unwrap();
    assert_eq!(result.provider, ProviderKind::Primary);
    assert_eq!(router.breaker().consecutive_failures(), 0);
}

#[tokio::test]
async fn test_quota_exhaustion_opens_immediately() {
    let primary = ScriptedPrimary::failing(1, ProviderError::QuotaExhausted("limit".into()));
    let (router, _clock) = router_with(&config(5, 60), primary.clone());

    let result = router
        .analyze(&AnalysisRequest::new("text"))
        .await
        .unwrap();

    assert!(result.degraded);
    assert_eq!(router.state(), CircuitState::Open);

    // No further primary calls while the cooldown runs
    router.analyze(&AnalysisRequest::new("text")).await.unwrap();
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn test_attempt_timeout_counts_as_failure() {
    let mut cfg = config(1, 60);
    cfg.primary.request_timeout_secs = 1;
    let primary = ScriptedPrimary::slow(Duration::from_secs(3), 0);
    let (router, _clock) = router_with(&cfg, primary.clone());

    let result = router
        .analyze(&AnalysisRequest::new("hurry up"))
        .await
        .unwrap();

    assert_eq!(result.provider, ProviderKind::Fallback);
    assert_eq!(router.state(), CircuitState::Open);
    assert_eq!(router.breaker().metrics().timeout_count, 1);
    assert_eq!(
        router.status().circuit.last_error_code.as_deref(),
        Some("timeout")
    );
}

#[tokio::test]
async fn test_concurrent_callers_share_one_probe() {
    let primary = ScriptedPrimary::slow(Duration::from_millis(100), 1);
    let (router, clock) = router_with(&config(1, 60), primary.clone());
    let request = AnalysisRequest::new("are you back?");

    router.analyze(&request).await.unwrap();
    assert_eq!(router.state(), CircuitState::Open);
    assert_eq!(primary.calls(), 1);

    clock.advance(Duration::from_secs(61));
    let results = join_all((0..8).map(|_| router.analyze(&request))).await;

    let answered_by_primary = results
        .iter()
        .filter(|r| r.as_ref().unwrap().provider == ProviderKind::Primary)
        .count();
    assert_eq!(answered_by_primary, 1);
    assert_eq!(primary.calls(), 2);
    assert_eq!(router.state(), CircuitState::Closed);
}
