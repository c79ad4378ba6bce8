use async_trait::async_trait;

use crate::types::outcome::ItemOutcome;

/// Two-stage check of a single identifier: ban lookup, then valuation.
///
/// Implementations must not fail for ordinary upstream problems. A failed
/// lookup is encoded as a [stage-1] or [stage-2] error outcome so the runner
/// keeps going.
///
/// [stage-1]: crate::OutcomeKind::UpstreamErrorStage1
/// [stage-2]: crate::OutcomeKind::UpstreamErrorStage2
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    async fn process_item(&self, id: &str) -> ItemOutcome;
}
