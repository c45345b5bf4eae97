pub mod fallback;
pub mod primary;
pub mod types;

pub use fallback::KeywordProvider;
pub use primary::HttpProvider;
pub use types::{AnalysisRequest, AnalysisResult, HealthHint, ProviderError, ProviderKind};

use async_trait::async_trait;

/// Capability shared by the primary and fallback providers
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Which side of the router this provider serves
    fn kind(&self) -> ProviderKind;

    /// Analyze a request; the fallback implementation never returns `Err`
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, ProviderError>;

    /// Diagnostic hint for health endpoints
    fn health_hint(&self) -> HealthHint;
}
